use super::config::ScreenConfig;
use super::error::EngineError;
use super::layout::ScreenLayout;
use super::progress::ProgressReporter;
use super::state::{Action, IterationState, ScreenRecord};
use crate::core::store::Store;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

/// Everything an action needs: the store, the resolved configuration, the
/// screen's persisted record and a random generator.
pub struct ScreenContext<'a> {
    pub store: Store,
    pub config: &'a ScreenConfig,
    pub reporter: &'a ProgressReporter<'a>,
    pub layout: ScreenLayout,
    record: ScreenRecord,
    rng: StdRng,
}

impl<'a> ScreenContext<'a> {
    /// Loads the screen's record, starting a fresh one in `seeded` if the
    /// screen has never run.
    pub fn new(
        store: Store,
        config: &'a ScreenConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        let record = match store.load_screen::<ScreenRecord>(&config.name)? {
            Some(record) => record,
            None => {
                info!("Starting new screen '{}'", config.name);
                ScreenRecord::default()
            }
        };
        let layout = ScreenLayout::new(&config.workdir, &config.name);
        let rng = StdRng::seed_from_u64(config.random_seed);
        Ok(Self {
            store,
            config,
            reporter,
            layout,
            record,
            rng,
        })
    }

    pub fn screen(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> IterationState {
        self.record.state
    }

    pub fn iteration(&self) -> u32 {
        self.record.iteration
    }

    pub fn record(&self) -> &ScreenRecord {
        &self.record
    }

    pub fn cutoff(&self, iteration: u32) -> Option<f64> {
        self.record.cutoff(iteration)
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Checks that `action` may run now and reseeds the generator for the
    /// `(seed, iteration, action)` triple, so reruns draw the same values.
    pub fn begin(&mut self, action: Action, iteration: u32) -> Result<(), EngineError> {
        action.check(self.record.state)?;
        self.rng = StdRng::seed_from_u64(mix_seed(self.config.random_seed, iteration, action));
        debug!(
            screen = %self.config.name,
            %action,
            iteration,
            state = %self.record.state,
            "Beginning action"
        );
        Ok(())
    }

    /// Persists the state reached by `action` for `iteration`.
    pub fn complete(&mut self, action: Action, iteration: u32) -> Result<(), EngineError> {
        if let Some(state) = action.result_state() {
            self.record.state = state;
        }
        self.record.iteration = iteration;
        self.save()?;
        info!(
            "Screen '{}' is now '{}' at iteration {}",
            self.config.name, self.record.state, self.record.iteration
        );
        Ok(())
    }

    /// Records the cutoff for `iteration`. An existing value is kept.
    pub fn set_cutoff(&mut self, iteration: u32, cutoff: f64) -> Result<f64, EngineError> {
        let stored = *self.record.cutoffs.entry(iteration).or_insert(cutoff);
        self.save()?;
        Ok(stored)
    }

    fn save(&self) -> Result<(), EngineError> {
        self.store.save_screen(&self.config.name, &self.record)?;
        Ok(())
    }
}

/// SplitMix64-style mixing of the configured seed with the iteration and
/// action.
fn mix_seed(seed: u64, iteration: u32, action: Action) -> u64 {
    let mut z = seed
        ^ (u64::from(iteration)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (action.ordinal() + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
