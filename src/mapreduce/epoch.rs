//! In-process execution of one epoch: parallel map, shuffle, parallel reduce.
//!
//! This plays the part of the distributed engine for local runs and tests.
//! Partitions are mapped concurrently with rayon against one shared grid
//! snapshot; contributions are grouped by neuron id; every neuron id is then
//! reduced concurrently, including neurons that received nothing.

use crate::config::EpochConfig;
use crate::error::{Result, SomError};
use crate::mapreduce::{
    Accumulator, Contribution, InstanceCounter, MapStats, MapTask, NeuronUpdate, Reducer,
};
use crate::som::NeuronGrid;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;

/// Where an epoch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochPhase {
    /// Not started.
    Idle,
    /// Map tasks running.
    Mapping,
    /// Grouping contributions by neuron.
    Shuffling,
    /// Reduce tasks running.
    Reducing,
    /// Updates produced.
    Complete,
}

impl fmt::Display for EpochPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EpochPhase::Idle => "idle",
            EpochPhase::Mapping => "mapping",
            EpochPhase::Shuffling => "shuffling",
            EpochPhase::Reducing => "reducing",
            EpochPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Result of one epoch.
#[derive(Debug, Clone)]
pub struct EpochOutput {
    /// One update per neuron, in neuron order.
    pub updates: Vec<NeuronUpdate>,
    /// Map statistics summed over partitions.
    pub stats: MapStats,
    /// Counter value each partition ended with.
    pub partition_counters: Vec<u64>,
}

impl EpochOutput {
    /// Number of input vectors mapped.
    pub fn instances(&self) -> u64 {
        self.stats.mapped
    }

    /// Neurons that received zero activation.
    pub fn degenerate(&self) -> Vec<usize> {
        self.updates
            .iter()
            .filter(|u| u.is_degenerate())
            .map(|u| u.neuron)
            .collect()
    }

    /// Neurons marked inactive.
    pub fn inactive(&self) -> Vec<usize> {
        self.updates
            .iter()
            .filter(|u| u.weights().is_none())
            .map(|u| u.neuron)
            .collect()
    }

    /// Assembles the next epoch's grid from these updates.
    pub fn next_grid(&self, previous: &NeuronGrid) -> Result<NeuronGrid> {
        previous.apply_updates(&self.updates)
    }
}

/// Map output of one partition before the shuffle.
enum Partial {
    Grouped(Vec<Vec<Contribution>>),
    Combined(Vec<Accumulator>),
}

struct PartitionOutput {
    partial: Partial,
    stats: MapStats,
    counter: u64,
}

/// Runs exactly one epoch over in-memory partitions.
pub struct EpochRunner<'a> {
    config: &'a EpochConfig,
    grid: &'a NeuronGrid,
    combine: bool,
    phase: EpochPhase,
}

impl<'a> EpochRunner<'a> {
    /// Creates a runner for `grid`, validating it against `config`.
    pub fn new(config: &'a EpochConfig, grid: &'a NeuronGrid) -> Result<Self> {
        config.validate()?;
        if grid.neuron_count() != config.neuron_count || grid.dimension() != config.attribute_dimension {
            return Err(SomError::Config(format!(
                "grid is {}x{}, configuration expects {}x{}",
                grid.neuron_count(),
                grid.dimension(),
                config.neuron_count,
                config.attribute_dimension
            )));
        }

        Ok(Self {
            config,
            grid,
            combine: false,
            phase: EpochPhase::Idle,
        })
    }

    /// Pre-aggregates contributions per neuron inside each map task.
    pub fn with_combiner(mut self, combine: bool) -> Self {
        self.combine = combine;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    /// Runs the epoch. A runner can run once.
    pub fn run(&mut self, partitions: &[Vec<String>]) -> Result<EpochOutput> {
        if self.phase != EpochPhase::Idle {
            return Err(SomError::State(format!(
                "cannot start an epoch in phase {}",
                self.phase
            )));
        }

        self.enter(EpochPhase::Mapping);
        let counter = InstanceCounter::for_mode(self.config.counter_mode, self.config.counter_baseline);
        let mapped: Vec<PartitionOutput> = {
            let this = &*self;
            partitions
                .par_iter()
                .enumerate()
                .map(|(i, records)| this.map_partition(i, records, counter.clone()))
                .collect::<Result<Vec<_>>>()?
        };

        let mut stats = MapStats::default();
        for output in &mapped {
            stats.merge(&output.stats);
        }
        let partition_counters: Vec<u64> = mapped.iter().map(|o| o.counter).collect();
        info!(
            "Mapped {} records over {} partitions ({} skipped, {} emissions)",
            stats.mapped,
            partitions.len(),
            stats.skipped,
            stats.emitted
        );
        if stats.skipped > 0 {
            warn!("{} malformed records skipped", stats.skipped);
        }

        self.enter(EpochPhase::Shuffling);
        let reducer = Reducer::new(self.grid, self.config.degenerate_policy);
        let n = self.grid.neuron_count();

        let (mut groups, mut partials): (Vec<Vec<Contribution>>, Vec<Accumulator>) = if self.combine {
            (Vec::new(), vec![reducer.accumulator(); n])
        } else {
            (vec![Vec::new(); n], Vec::new())
        };

        for output in mapped {
            match output.partial {
                Partial::Grouped(by_neuron) => {
                    for (group, values) in groups.iter_mut().zip(by_neuron) {
                        group.extend(values);
                    }
                }
                Partial::Combined(by_neuron) => {
                    for (acc, partial) in partials.iter_mut().zip(&by_neuron) {
                        acc.merge(partial)?;
                    }
                }
            }
        }

        self.enter(EpochPhase::Reducing);
        let updates: Vec<NeuronUpdate> = if self.combine {
            partials
                .par_iter()
                .enumerate()
                .map(|(j, acc)| reducer.finish(j, acc))
                .collect::<Result<Vec<_>>>()?
        } else {
            groups
                .into_par_iter()
                .enumerate()
                .map(|(j, values)| reducer.reduce(j, values))
                .collect::<Result<Vec<_>>>()?
        };

        let degenerate = updates.iter().filter(|u| u.is_degenerate()).count();
        if degenerate > 0 {
            warn!("{} of {} neurons received zero activation", degenerate, n);
        }

        self.enter(EpochPhase::Complete);
        Ok(EpochOutput {
            updates,
            stats,
            partition_counters,
        })
    }

    fn enter(&mut self, phase: EpochPhase) {
        info!("Epoch phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn map_partition(
        &self,
        index: usize,
        records: &[String],
        counter: InstanceCounter,
    ) -> Result<PartitionOutput> {
        let n = self.grid.neuron_count();
        let mut task = MapTask::new(self.grid, self.config, counter)?;

        let partial = if self.combine {
            let mut accs = vec![Accumulator::new(self.grid.dimension()); n];
            let mut failure = None;
            task.map_partition(records, |j, c| {
                if let Err(e) = accs[j].add(&c) {
                    failure.get_or_insert(e);
                }
            })?;
            if let Some(e) = failure {
                return Err(e);
            }
            Partial::Combined(accs)
        } else {
            let mut groups: Vec<Vec<Contribution>> = vec![Vec::new(); n];
            task.map_partition(records, |j, c| groups[j].push(c))?;
            Partial::Grouped(groups)
        };

        debug!(
            "Partition {}: {} records mapped, counter at {}",
            index,
            task.stats().mapped,
            task.counter().value()
        );

        Ok(PartitionOutput {
            partial,
            stats: *task.stats(),
            counter: task.counter().value(),
        })
    }
}
