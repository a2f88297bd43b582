use std::path::PathBuf;

/// Values used when neither the protocol file, `-S` nor a dedicated flag sets
/// them. Section settings not listed here take the core defaults.
pub struct DefaultsConfig {
    pub workdir: PathBuf,
    pub random_seed: u64,
    pub batch_fraction: f64,
    pub workers: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            random_seed: 42,
            batch_fraction: 0.01,
            workers: 1,
        }
    }
}
