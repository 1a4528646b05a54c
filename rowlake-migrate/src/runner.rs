//! The migration runner.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use rowlake_warehouse::{
    Catalog, InsertPipeline, QueryExecutor, WarehouseApi, WarehouseConfig,
};

use crate::error::MigrateResult;
use crate::ledger::Ledger;
use crate::migration::{LiveOps, MigrationSet, PretendOps};

/// Options for a forward run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Render intended operations without executing them.
    pub pretend: bool,
}

impl RunOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretend mode.
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }
}

/// Options for a rollback.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackOptions {
    /// Render intended operations without executing them.
    pub pretend: bool,
    /// Roll back this many migrations instead of the last batch.
    /// 0 targets the last batch.
    pub step: usize,
}

impl RollbackOptions {
    /// Create default options (last batch, not pretend).
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretend mode.
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    /// Roll back a fixed number of migrations.
    pub fn step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }
}

/// Result of a forward run.
#[derive(Debug)]
pub struct RunReport {
    /// Batch number shared by every applied migration; 0 when nothing
    /// ran or the run was pretend.
    pub batch: i64,
    /// Names of the migrations that ran, in application order.
    pub ran: Vec<String>,
    /// Human-readable notes collected along the way.
    pub notes: Vec<String>,
}

impl RunReport {
    /// One-line summary of the run.
    pub fn summary(&self) -> String {
        if self.ran.is_empty() {
            "Nothing to migrate".to_string()
        } else {
            format!("{} applied in batch {}", self.ran.len(), self.batch)
        }
    }
}

/// Result of a rollback.
#[derive(Debug)]
pub struct RollbackReport {
    /// Names of the migrations reversed, in rollback order.
    pub rolled_back: Vec<String>,
    /// Human-readable notes collected along the way.
    pub notes: Vec<String>,
}

impl RollbackReport {
    /// One-line summary of the rollback.
    pub fn summary(&self) -> String {
        if self.rolled_back.is_empty() {
            "Nothing to rollback".to_string()
        } else {
            format!("{} rolled back", self.rolled_back.len())
        }
    }
}

/// Orchestrates migration runs against the warehouse.
///
/// Forward runs apply pending definitions in name order under a single
/// batch number; rollbacks reverse the last batch, or the `step` most
/// recent migrations. A failure inside any `up()`/`down()` aborts the
/// rest of the run with the ledger reflecting only what completed —
/// there are no partial-commit semantics to fall back on.
pub struct Runner {
    config: Arc<WarehouseConfig>,
    set: MigrationSet,
    ledger: Ledger,
    live: LiveOps,
}

impl Runner {
    /// Create a runner over a warehouse client and a set of migration
    /// definitions.
    pub fn new(
        api: Arc<dyn WarehouseApi>,
        config: Arc<WarehouseConfig>,
        set: MigrationSet,
    ) -> Self {
        let catalog = Catalog::new(api.clone(), config.clone());
        let executor = QueryExecutor::new(api.clone(), config.clone());
        let pipeline = InsertPipeline::new(api, executor.clone(), config.clone());
        let ledger = Ledger::new(
            catalog.clone(),
            executor.clone(),
            pipeline.clone(),
            config.clone(),
        );
        let live = LiveOps::new(catalog, executor, pipeline);

        Self {
            config,
            set,
            ledger,
            live,
        }
    }

    /// The ledger backing this runner.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The registered migration definitions.
    pub fn set(&self) -> &MigrationSet {
        &self.set
    }

    /// Apply every pending migration.
    ///
    /// The default dataset and the ledger table are bootstrapped first,
    /// pretend mode included; everything past that point is recorded
    /// instead of executed when pretending.
    pub async fn run(&self, options: &RunOptions) -> MigrateResult<RunReport> {
        let mut notes = Vec::new();

        let bootstrap = self.ledger.ensure_ready().await?;
        if bootstrap.dataset_created {
            notes.push(format!(
                "Dataset {} created.",
                self.config.default_dataset
            ));
        }

        let applied: HashSet<String> = self.ledger.get_applied().await?.into_iter().collect();
        let pending: Vec<_> = self
            .set
            .in_name_order()
            .into_iter()
            .filter(|m| !applied.contains(m.name()))
            .collect();

        if pending.is_empty() {
            notes.push("Nothing to migrate.".to_string());
            info!("nothing to migrate");
            return Ok(RunReport {
                batch: 0,
                ran: Vec::new(),
                notes,
            });
        }

        let batch = self.ledger.next_batch_number().await?;
        let mut ran = Vec::new();

        for migration in pending {
            let name = migration.name().to_string();
            notes.push(format!("Migrating: {name}"));
            info!(migration = %name, batch, pretend = options.pretend, "running up");

            if options.pretend {
                let recorder = PretendOps::new(self.config.default_dataset.clone());
                migration.up(&recorder).await?;
                for op in recorder.take_notes() {
                    notes.push(format!("{name}: {op}"));
                }
                ran.push(name);
                continue;
            }

            migration.up(&self.live).await?;
            if migration.log() {
                self.ledger.record(&name, batch).await?;
            }

            notes.push(format!("Migrated:  {name}"));
            ran.push(name);
        }

        Ok(RunReport {
            batch: if options.pretend { 0 } else { batch },
            ran,
            notes,
        })
    }

    /// Reverse the last batch, or the `step` most recent migrations.
    pub async fn rollback(&self, options: &RollbackOptions) -> MigrateResult<RollbackReport> {
        let mut notes = Vec::new();

        let targets = if options.step > 0 {
            self.ledger.entries_for_steps(options.step).await?
        } else {
            self.ledger.last_batch_entries().await?
        };

        if targets.is_empty() {
            notes.push("Nothing to rollback.".to_string());
            info!("nothing to rollback");
            return Ok(RollbackReport {
                rolled_back: Vec::new(),
                notes,
            });
        }

        let mut rolled_back = Vec::new();

        // Targets arrive in reverse application order already.
        for entry in targets {
            let Some(migration) = self.set.get(&entry.migration) else {
                notes.push(format!("Migration not found: {}", entry.migration));
                warn!(migration = %entry.migration, "definition not found, skipping");
                continue;
            };

            notes.push(format!("Rolling back: {}", entry.migration));
            info!(migration = %entry.migration, pretend = options.pretend, "running down");

            if options.pretend {
                let recorder = PretendOps::new(self.config.default_dataset.clone());
                migration.down(&recorder).await?;
                for op in recorder.take_notes() {
                    notes.push(format!("{}: {op}", entry.migration));
                }
                rolled_back.push(entry.migration);
                continue;
            }

            migration.down(&self.live).await?;
            self.ledger.remove(&entry.migration).await?;

            notes.push(format!("Rolled back:  {}", entry.migration));
            rolled_back.push(entry.migration);
        }

        Ok(RollbackReport { rolled_back, notes })
    }
}
