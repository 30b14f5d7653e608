//! # Simulation Driver
//!
//! One tick of a fixed-rate simulation:
//! ```text
//! Tick N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. LOGIC                                                            │
//! │    ├─ Query and mutate components in place                          │
//! │    └─ Stage creations, enqueue removes/moves through the factory    │
//! │                                                                     │
//! │ 2. SUBMIT                                                           │
//! │    └─ EntitiesDb::step(): the only point where storage changes      │
//! │                                                                     │
//! │ 3. RECORD                                                           │
//! │    └─ Tick timing against the budget                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The driver adds no ordering of its own; it stands in for whatever
//! scheduler decides when a tick runs.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strata_core::{
    ComponentRegistry, DatabaseConfig, DbError, DbResult, EntitiesDb, StreamConfig,
    SubmissionConfig, SubmissionStats,
};

/// Default tick rate.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Configuration for the simulation driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Target ticks per second; sets the per-tick budget.
    pub target_tick_rate: u32,
    /// Log ticks that exceed the budget.
    pub enable_timing_logs: bool,
    /// Submission engine settings.
    pub submission: SubmissionConfig,
    /// Change stream settings.
    pub stream: StreamConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target_tick_rate: DEFAULT_TICK_RATE,
            enable_timing_logs: false,
            submission: SubmissionConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Parses a `DriverConfig` from a TOML document.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> DbResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| DbError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] naming the first invalid value.
    pub fn validate(&self) -> DbResult<()> {
        if self.target_tick_rate == 0 {
            return Err(DbError::InvalidConfig(
                "target_tick_rate must be at least 1".into(),
            ));
        }
        self.database().validate()
    }

    /// Time budget of one tick.
    #[must_use]
    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs(1) / self.target_tick_rate.max(1)
    }

    fn database(&self) -> DatabaseConfig {
        DatabaseConfig {
            submission: self.submission.clone(),
            stream: self.stream.clone(),
        }
    }
}

/// Timing of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Tick number, starting at 0.
    pub tick: u64,
    /// Total tick time in microseconds.
    pub total_us: u64,
    /// Caller logic time in microseconds.
    pub logic_us: u64,
    /// Submission time in microseconds.
    pub submission_us: u64,
    /// What the submission did.
    pub submission: SubmissionStats,
}

/// Owns the database and runs ticks against it.
#[derive(Debug)]
pub struct SimulationDriver {
    db: EntitiesDb,
    config: DriverConfig,
    tick_count: u64,
    stats: TickStatsAccumulator,
}

impl SimulationDriver {
    /// Creates a driver and the database it owns.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if the configuration is invalid.
    pub fn new(registry: ComponentRegistry, config: DriverConfig) -> DbResult<Self> {
        config.validate()?;
        let db = EntitiesDb::with_config(registry, config.database())?;
        let stats = TickStatsAccumulator::new(config.tick_budget());
        tracing::debug!(
            tick_rate = config.target_tick_rate,
            budget_us = duration_us(config.tick_budget()),
            "simulation driver created"
        );
        Ok(Self {
            db,
            config,
            tick_count: 0,
            stats,
        })
    }

    /// Runs `logic`, then submits everything it requested.
    ///
    /// # Arguments
    ///
    /// * `logic` - Caller work for this tick; it sees the state committed by
    ///   the previous tick
    ///
    /// # Errors
    ///
    /// The first error of `logic` or of the submission. A failed tick is not
    /// counted or recorded.
    pub fn tick<F>(&mut self, logic: F) -> DbResult<TickStats>
    where
        F: FnOnce(&mut EntitiesDb) -> DbResult<()>,
    {
        let started = Instant::now();
        logic(&mut self.db)?;
        let logic_done = Instant::now();

        let submission = self.db.step().map_err(|err| {
            tracing::error!(tick = self.tick_count, error = %err, "tick submission failed");
            err
        })?;
        let finished = Instant::now();

        let stats = TickStats {
            tick: self.tick_count,
            total_us: duration_us(finished.duration_since(started)),
            logic_us: duration_us(logic_done.duration_since(started)),
            submission_us: duration_us(finished.duration_since(logic_done)),
            submission,
        };
        self.end_tick(stats);
        Ok(stats)
    }

    fn end_tick(&mut self, stats: TickStats) {
        self.tick_count += 1;
        self.stats.record(stats);

        if self.config.enable_timing_logs && stats.total_us > self.stats.budget_us {
            tracing::warn!(
                tick = stats.tick,
                total_ms = stats.total_us as f64 / 1000.0,
                budget_ms = self.stats.budget_us as f64 / 1000.0,
                submission_us = stats.submission_us,
                "tick exceeded budget"
            );
        }
    }

    /// The database.
    #[inline]
    #[must_use]
    pub fn db(&self) -> &EntitiesDb {
        &self.db
    }

    /// The database, for registering engines and consumers.
    #[inline]
    pub fn db_mut(&mut self) -> &mut EntitiesDb {
        &mut self.db
    }

    /// Completed ticks.
    #[inline]
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The driver configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Accumulated tick statistics.
    #[must_use]
    pub fn stats(&self) -> &TickStatsAccumulator {
        &self.stats
    }
}

/// Accumulator for tick statistics.
#[derive(Clone, Debug)]
pub struct TickStatsAccumulator {
    /// Total ticks recorded.
    pub ticks_recorded: u64,
    /// Sum of total tick times.
    pub total_us_sum: u64,
    /// Sum of logic times.
    pub logic_us_sum: u64,
    /// Sum of submission times.
    pub submission_us_sum: u64,
    /// Min tick time.
    pub min_tick_us: u64,
    /// Max tick time.
    pub max_tick_us: u64,
    /// Ticks that exceeded the budget.
    pub ticks_over_budget: u64,
    /// Structural changes applied across all ticks.
    pub changes: u64,
    /// Per-tick budget in microseconds.
    pub budget_us: u64,
}

impl TickStatsAccumulator {
    /// Creates an accumulator measuring against `budget`.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            ticks_recorded: 0,
            total_us_sum: 0,
            logic_us_sum: 0,
            submission_us_sum: 0,
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            ticks_over_budget: 0,
            changes: 0,
            budget_us: duration_us(budget),
        }
    }

    /// Records a tick's statistics.
    pub fn record(&mut self, stats: TickStats) {
        self.ticks_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.logic_us_sum += stats.logic_us;
        self.submission_us_sum += stats.submission_us;
        self.min_tick_us = self.min_tick_us.min(stats.total_us);
        self.max_tick_us = self.max_tick_us.max(stats.total_us);
        self.changes += stats.submission.total_changes() as u64;

        if stats.total_us > self.budget_us {
            self.ticks_over_budget += 1;
        }
    }

    /// Returns average tick time in milliseconds.
    #[must_use]
    pub fn avg_tick_ms(&self) -> f64 {
        self.average_ms(self.total_us_sum)
    }

    /// Returns average submission time in milliseconds.
    #[must_use]
    pub fn avg_submission_ms(&self) -> f64 {
        self.average_ms(self.submission_us_sum)
    }

    /// Returns the fraction of ticks over budget.
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.ticks_recorded == 0 {
            return 0.0;
        }
        self.ticks_over_budget as f64 / self.ticks_recorded as f64
    }

    fn average_ms(&self, sum_us: u64) -> f64 {
        if self.ticks_recorded == 0 {
            return 0.0;
        }
        (sum_us as f64 / self.ticks_recorded as f64) / 1000.0
    }
}

impl Default for TickStatsAccumulator {
    fn default() -> Self {
        Self::new(Duration::from_secs(1) / DEFAULT_TICK_RATE)
    }
}

impl fmt::Display for TickStatsAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ticks_recorded == 0 {
            return write!(f, "no ticks recorded");
        }
        write!(
            f,
            "{} ticks, avg {:.3}ms (submit {:.3}ms), min {:.3}ms, max {:.3}ms, {} over {:.3}ms budget ({:.1}%), {} changes",
            self.ticks_recorded,
            self.avg_tick_ms(),
            self.avg_submission_ms(),
            self.min_tick_us as f64 / 1000.0,
            self.max_tick_us as f64 / 1000.0,
            self.ticks_over_budget,
            self.budget_us as f64 / 1000.0,
            self.over_budget_ratio() * 100.0,
            self.changes
        )
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Component, ComponentId, Egid, EntityDescriptor, GroupId};

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Counter(u32);

    impl Component for Counter {
        const ID: ComponentId = ComponentId(0);
        const NAME: &'static str = "Counter";
    }

    fn driver() -> SimulationDriver {
        let mut registry = ComponentRegistry::new();
        registry.register::<Counter>().unwrap();
        SimulationDriver::new(registry, DriverConfig::default()).unwrap()
    }

    #[test]
    fn test_driver_creation() {
        let driver = driver();
        assert_eq!(driver.tick_count(), 0);
        assert_eq!(driver.config().tick_budget(), Duration::from_secs(1) / 60);
    }

    #[test]
    fn test_tick_commits_logic() {
        let mut driver = driver();
        let descriptor = EntityDescriptor::builder("counter").with::<Counter>().build();

        let stats = driver
            .tick(|db| {
                db.factory()
                    .build_entity(Egid::from_raw(1, 0), &descriptor)?
                    .init(Counter(7))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(stats.tick, 0);
        assert_eq!(stats.submission.entities_added, 1);

        driver
            .tick(|db| {
                db.query_entity_mut::<Counter>(Egid::from_raw(1, 0))?.0 += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(
            driver.db().store().query_entity::<Counter>(Egid::from_raw(1, 0)),
            Ok(&Counter(8))
        );
        assert_eq!(driver.tick_count(), 2);
        assert_eq!(driver.stats().ticks_recorded, 2);
        assert_eq!(driver.stats().changes, 1);
    }

    #[test]
    fn test_failed_tick_not_recorded() {
        let mut driver = driver();
        let err = driver
            .tick(|db| {
                db.query_entity_mut::<Counter>(Egid::from_raw(9, 0))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, DbError::EntityNotFound(_)));
        assert_eq!(driver.tick_count(), 0);
        assert_eq!(driver.stats().ticks_recorded, 0);
    }

    #[test]
    fn test_submission_error_surfaces() {
        let mut driver = driver();
        let descriptor = EntityDescriptor::builder("counter").with::<Counter>().build();
        let err = driver
            .tick(|db| {
                db.factory().remove_entity(Egid::from_raw(3, 0), &descriptor);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, DbError::SubmissionFailed { .. }));
        assert!(!driver.db().store().has_group(GroupId(0)));
    }

    #[test]
    fn test_config_from_toml() {
        let config = DriverConfig::from_toml_str(
            r"
            target_tick_rate = 30
            enable_timing_logs = true

            [submission]
            max_iterations = 2
            ",
        )
        .unwrap();
        assert_eq!(config.target_tick_rate, 30);
        assert!(config.enable_timing_logs);
        assert_eq!(config.submission.max_iterations, 2);
        assert_eq!(config.stream, StreamConfig::default());

        assert!(DriverConfig::from_toml_str("target_tick_rate = 0").is_err());
        assert!(DriverConfig::from_toml_str("[submission]\nmax_iterations = 0").is_err());
    }

    #[test]
    fn test_stats_accumulator() {
        let mut acc = TickStatsAccumulator::new(Duration::from_millis(10));

        for i in 0..100 {
            acc.record(TickStats {
                tick: i,
                total_us: 5_000 + i * 100,
                logic_us: 4_000,
                submission_us: 1_000 + i * 100,
                submission: SubmissionStats::default(),
            });
        }

        assert_eq!(acc.ticks_recorded, 100);
        assert_eq!(acc.min_tick_us, 5_000);
        assert_eq!(acc.max_tick_us, 14_900);
        // Ticks 51..=99 exceed 10ms.
        assert_eq!(acc.ticks_over_budget, 49);
        assert!(acc.avg_tick_ms() > 9.0 && acc.avg_tick_ms() < 11.0);
        assert!(acc.to_string().starts_with("100 ticks"));
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = TickStatsAccumulator::default();
        assert_eq!(acc.avg_tick_ms(), 0.0);
        assert_eq!(acc.over_budget_ratio(), 0.0);
        assert_eq!(acc.to_string(), "no ticks recorded");
    }
}
