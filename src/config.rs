//! Tracing configuration. Loading this from the process environment is an
//! external-collaborator concern (§1); the core only ever consumes an
//! already-built [`Config`].

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Quantization unit in seconds for the timestamp codec.
    pub time_resolution: f64,
    /// zlib-compress the timestamp stream.
    pub ts_compression: bool,
    /// Include `tid` in the call-signature key.
    pub store_tid: bool,
    /// Include `call_depth` in the call-signature key.
    pub store_call_depth: bool,
    /// Run the §4.6 inter-process CST/CFG merge at finalize.
    pub interprocess_compression: bool,
    /// Run §4.6's offset-pattern substitution across ranks.
    pub interprocess_pattern_recognition: bool,
    /// Reserved: per-rank offset substitution (no cross-rank communication).
    pub intraprocess_pattern_recognition: bool,
    /// Number of (value, exponent) slots the timestamp buffer starts with
    /// before it begins doubling.
    pub ts_initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            time_resolution: 1e-7,
            ts_compression: true,
            store_tid: false,
            store_call_depth: true,
            interprocess_compression: true,
            interprocess_pattern_recognition: false,
            intraprocess_pattern_recognition: false,
            ts_initial_capacity: 1024,
        }
    }
}

impl Config {
    /// Loads overrides from the documented `RECORDER_*` environment
    /// variables, falling back to [`Config::default`] for anything unset or
    /// unparsable. Never fails: a malformed variable is logged and ignored
    /// per §7's configuration-error policy ("falls back to defaults").
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Some(v) = env_f64("RECORDER_TIME_RESOLUTION") {
            if v > 0.0 {
                cfg.time_resolution = v;
            } else {
                log::warn!("[Recorder] RECORDER_TIME_RESOLUTION must be positive, ignoring");
            }
        }
        if let Some(v) = env_bool("RECORDER_TIME_COMPRESSION") {
            cfg.ts_compression = v;
        }
        if let Some(v) = env_bool("RECORDER_STORE_TID") {
            cfg.store_tid = v;
        }
        if let Some(v) = env_bool("RECORDER_STORE_CALL_DEPTH") {
            cfg.store_call_depth = v;
        }
        if let Some(v) = env_bool("RECORDER_INTERPROCESS_COMPRESSION") {
            cfg.interprocess_compression = v;
        }
        if let Some(v) = env_bool("RECORDER_INTERPROCESS_PATTERN_RECOGNITION") {
            cfg.interprocess_pattern_recognition = v;
        }
        if let Some(v) = env_bool("RECORDER_INTRAPROCESS_PATTERN_RECOGNITION") {
            cfg.intraprocess_pattern_recognition = v;
        }
        if env_bool("RECORDER_WITH_NON_MPI") == Some(true) {
            cfg.interprocess_pattern_recognition = false;
            cfg.interprocess_compression = false;
        }

        cfg
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| match v.as_str() {
        "0" => Some(false),
        "1" => Some(true),
        _ => {
            log::warn!("[Recorder] {} must be 0 or 1, ignoring", name);
            None
        }
    })
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let cfg = Config::default();
        assert_eq!(cfg.time_resolution, 1e-7);
        assert!(cfg.ts_compression);
        assert!(!cfg.store_tid);
        assert!(cfg.store_call_depth);
        assert!(cfg.interprocess_compression);
        assert!(!cfg.interprocess_pattern_recognition);
    }
}
