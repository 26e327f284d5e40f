//! The fixed, append-only table of known functions (§3's "func_id"):
//! POSIX I/O, MPI, MPI-IO and HDF5 call names, in a stable order so that
//! `func_id` is a small integer index into this table and `recorder.mt`'s
//! function-name list can be written in func_id order.
//!
//! Interception and argument rendering are out of scope for the core; only
//! the *names* and their layer classification are needed here, because the
//! Call-Signature Key embeds `func_id` and the metadata header embeds the
//! whole ordered name list.

/// Which traced API layer a function belongs to. Mirrors the boolean flags
/// in the metadata header (`posix_tracing`, `mpi_tracing`, `mpiio_tracing`,
/// `hdf5_tracing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Posix,
    Mpi,
    MpiIo,
    Hdf5,
}

/// A small integer identifying a known function, or the reserved sentinel
/// for a user-defined (non-intercepted) function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u8);

impl FuncId {
    pub const USER: FuncId = FuncId(255);

    pub fn name(self) -> &'static str {
        if self == FuncId::USER {
            "USER_FUNCTION"
        } else {
            FUNC_NAMES
                .get(self.0 as usize)
                .copied()
                .unwrap_or("UNKNOWN_FUNCTION")
        }
    }

    pub fn layer(self) -> Option<Layer> {
        let idx = self.0 as usize;
        if idx < POSIX_COUNT {
            Some(Layer::Posix)
        } else if idx < POSIX_COUNT + MPI_COUNT {
            // The MPI block mixes MPI-IO (`MPI_File_*`) and plain MPI calls;
            // the two layers share a numbering range but are distinct flags
            // in the metadata header.
            if self.name().starts_with("MPI_File_") {
                Some(Layer::MpiIo)
            } else {
                Some(Layer::Mpi)
            }
        } else if idx < POSIX_COUNT + MPI_COUNT + HDF5_COUNT {
            Some(Layer::Hdf5)
        } else {
            None
        }
    }

    pub fn by_name(name: &str) -> Option<FuncId> {
        FUNC_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| FuncId(i as u8))
    }
}

const POSIX_COUNT: usize = 72;
const MPI_COUNT: usize = 84;
const HDF5_COUNT: usize = 74;

/// `func_list` from the original implementation, preserved verbatim
/// (order is load-bearing: it is the func_id numbering).
pub static FUNC_NAMES: &[&str] = &[
    // POSIX I/O - 72 functions
    "creat", "creat64", "open", "open64", "close", "write", "read", "lseek", "lseek64", "pread",
    "pread64", "pwrite", "pwrite64", "readv", "writev", "mmap", "mmap64", "fopen", "fopen64",
    "fclose", "fwrite", "fread", "ftell", "fseek", "fsync", "fdatasync", "__xstat", "__xstat64",
    "__lxstat", "__lxstat64", "__fxstat", "__fxstat64", "getcwd", "mkdir", "rmdir", "chdir",
    "link", "linkat", "unlink", "symlink", "symlinkat", "readlink", "readlinkat", "rename",
    "chmod", "chown", "lchown", "utime", "opendir", "readdir", "closedir", "rewinddir", "mknod",
    "mknodat", "fcntl", "dup", "dup2", "pipe", "mkfifo", "umask", "fdopen", "fileno", "access",
    "faccessat", "tmpfile", "remove", "truncate", "ftruncate", "msync", "fseeko", "ftello",
    "fflush",
    // MPI - 84 functions
    "MPI_File_close", "MPI_File_set_size", "MPI_File_iread_at", "MPI_File_iread",
    "MPI_File_iread_shared", "MPI_File_iwrite_at", "MPI_File_iwrite", "MPI_File_iwrite_shared",
    "MPI_File_open", "MPI_File_read_all_begin", "MPI_File_read_all", "MPI_File_read_at_all",
    "MPI_File_read_at_all_begin", "MPI_File_read_at", "MPI_File_read",
    "MPI_File_read_ordered_begin", "MPI_File_read_ordered", "MPI_File_read_shared",
    "MPI_File_set_view", "MPI_File_sync", "MPI_File_write_all_begin", "MPI_File_write_all",
    "MPI_File_write_at_all_begin", "MPI_File_write_at_all", "MPI_File_write_at",
    "MPI_File_write", "MPI_File_write_ordered_begin", "MPI_File_write_ordered",
    "MPI_File_write_shared", "MPI_Finalized", "MPI_Wtime", "MPI_Comm_rank", "MPI_Comm_size",
    "MPI_Get_processor_name", "MPI_Get_processor_name", "MPI_Comm_set_errhandler",
    "MPI_Barrier", "MPI_Bcast", "MPI_Gather", "MPI_Gatherv", "MPI_Scatter", "MPI_Scatterv",
    "MPI_Allgather", "MPI_Allgatherv", "MPI_Alltoall", "MPI_Reduce", "MPI_Allreduce",
    "MPI_Reduce_scatter", "MPI_Scan", "MPI_Type_commit", "MPI_Type_contiguous",
    "MPI_Type_extent", "MPI_Type_free", "MPI_Type_hindexed", "MPI_Op_create", "MPI_Op_free",
    "MPI_Type_get_envelope", "MPI_Type_size", "MPI_Type_create_darray", "MPI_Cart_rank",
    "MPI_Cart_create", "MPI_Cart_get", "MPI_Cart_shift", "MPI_Wait", "MPI_Send", "MPI_Recv",
    "MPI_Sendrecv", "MPI_Isend", "MPI_Irecv", "MPI_Info_create", "MPI_Info_set", "MPI_Info_get",
    "MPI_Waitall", "MPI_Waitsome", "MPI_Waitany", "MPI_Ssend", "MPI_Comm_split", "MPI_Comm_dup",
    "MPI_Comm_create", "MPI_File_seek", "MPI_File_seek_shared", "MPI_File_get_size",
    "MPI_Ibcast", "MPI_Test", "MPI_Testall", "MPI_Testsome", "MPI_Testany", "MPI_Ireduce",
    "MPI_Iscatter", "MPI_Igather", "MPI_Ialltoall", "MPI_Comm_free", "MPI_Cart_sub",
    "MPI_Comm_split_type",
    // HDF5 I/O - 74 functions
    "H5Fcreate", "H5Fopen", "H5Fclose", "H5Fflush", "H5Gclose", "H5Gcreate1", "H5Gcreate2",
    "H5Gget_objinfo", "H5Giterate", "H5Gopen1", "H5Gopen2", "H5Dclose", "H5Dcreate1",
    "H5Dcreate2", "H5Dget_create_plist", "H5Dget_space", "H5Dget_type", "H5Dopen1", "H5Dopen2",
    "H5Dread", "H5Dwrite", "H5Dset_extent", "H5Sclose", "H5Screate", "H5Screate_simple",
    "H5Sget_select_npoints", "H5Sget_simple_extent_dims", "H5Sget_simple_extent_npoints",
    "H5Sselect_elements", "H5Sselect_hyperslab", "H5Sselect_none", "H5Tclose", "H5Tcopy",
    "H5Tget_class", "H5Tget_size", "H5Tset_size", "H5Tcreate", "H5Tinsert", "H5Aclose",
    "H5Acreate1", "H5Acreate2", "H5Aget_name", "H5Aget_num_attrs", "H5Aget_space", "H5Aget_type",
    "H5Aopen", "H5Aopen_idx", "H5Aopen_name", "H5Aread", "H5Awrite", "H5Pclose", "H5Pcreate",
    "H5Pget_chunk", "H5Pget_mdc_config", "H5Pset_alignment", "H5Pset_chunk", "H5Pset_dxpl_mpio",
    "H5Pset_fapl_core", "H5Pset_fapl_mpio", "H5Pset_istore_k", "H5Pset_mdc_config",
    "H5Pset_meta_block_size", "H5Lexists", "H5Lget_val", "H5Literate", "H5Literate1",
    "H5Literate2", "H5Oclose", "H5Oget_info", "H5Oget_info_by_name", "H5Oopen",
    "H5Pset_coll_metadata_write", "H5Pget_coll_metadata_write", "H5Pset_all_coll_metadata_ops",
    "H5Pget_all_coll_metadata_ops",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_length_matches_layer_counts() {
        assert_eq!(FUNC_NAMES.len(), POSIX_COUNT + MPI_COUNT + HDF5_COUNT);
    }

    #[test]
    fn user_sentinel_has_no_layer() {
        assert_eq!(FuncId::USER.layer(), None);
        assert_eq!(FuncId::USER.name(), "USER_FUNCTION");
    }

    #[test]
    fn by_name_round_trips() {
        let id = FuncId::by_name("MPI_File_write_at").unwrap();
        assert_eq!(id.name(), "MPI_File_write_at");
        assert_eq!(id.layer(), Some(Layer::MpiIo));
    }

    #[test]
    fn first_posix_and_first_hdf5_boundaries() {
        assert_eq!(FuncId(0).name(), "creat");
        assert_eq!(FuncId(0).layer(), Some(Layer::Posix));
        let first_mpi = FuncId(POSIX_COUNT as u8);
        assert_eq!(first_mpi.name(), "MPI_File_close");
        assert_eq!(first_mpi.layer(), Some(Layer::MpiIo));
        let first_hdf5 = FuncId((POSIX_COUNT + MPI_COUNT) as u8);
        assert_eq!(first_hdf5.name(), "H5Fcreate");
        assert_eq!(first_hdf5.layer(), Some(Layer::Hdf5));
    }
}
