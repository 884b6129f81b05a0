//! [`Scheduler`] (`spec.md` §4.6, §6): drives the per-night, per-site event
//! loop that turns a [`Selection`] into a [`NightlyTimeline`].
//!
//! Grounded on `original_source/scheduler/core/builder/builder.py`'s
//! `ValidationBuilder`/`SimulationBuilder`/`OperationBuilder`: only
//! `Validation` has distinct behavior (observation statuses and used times
//! are reset on ingest, already handled by [`crate::collector::Collector::ingest`]'s
//! `validation_mode` flag); the original's `SimulationBuilder` and
//! `OperationBuilder` are themselves empty `pass` classes, so `Mode::Simulation`
//! and `Mode::Operation` run the same loop here too (`DESIGN.md`).

use crate::accounting;
use crate::accounting::stats::StatCalculator;
use crate::collector::Collector;
use crate::error::SchedError;
use crate::events::{Blockage, Event, EventKind, EventQueue};
use crate::model::{time_to_slots, NightIndex, NightStats, NightlyTimeline, Plan, Plans, Resource, Site, TimelineEntry, TimeslotIndex};
use crate::optimizer::{GreedyMaxOptimizer, Interval, Optimizer};
use crate::ranker::{default_band_params, Ranker, RankerParameters};
use crate::selector::{Selection, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Run mode (`spec.md` §6). Only `Validation` changes behavior in this
/// crate; see the module doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Validation,
    Simulation,
    Operation,
}

/// Drives nightly re-planning over a built [`Collector`] (`spec.md` §4.6).
/// Construct via [`crate::builder::SchedulerBuilder`].
pub struct Scheduler {
    collector: Arc<Collector>,
    selector: Selector,
}

impl Scheduler {
    #[must_use]
    pub fn new(collector: Arc<Collector>, ranker: Arc<Ranker>) -> Self {
        Self { selector: Selector::new(collector.clone(), ranker), collector }
    }

    /// Schedules `num_nights_to_schedule` nights across `sites`, returning
    /// the full [`NightlyTimeline`] and the `plans_summary` map from
    /// `spec.md` §6. `ranker_params`, when given, overrides the default
    /// scoring weights for this run only, rebuilding the `Ranker`/`Selector`
    /// pair rather than mutating the one this `Scheduler` was built with.
    pub async fn run(
        &self,
        mode: Mode,
        start_vis: chrono::NaiveDate,
        end_vis: chrono::NaiveDate,
        num_nights_to_schedule: u32,
        sites: &[Site],
        ranker_params: Option<RankerParameters>,
    ) -> Result<(NightlyTimeline, HashMap<String, (String, f64)>), SchedError> {
        log::info!(
            "scheduler run starting: mode={mode:?}, {num_nights_to_schedule} nights, {start_vis} - {end_vis}, sites={sites:?}"
        );

        let night_indices: Vec<NightIndex> = (0..num_nights_to_schedule).map(NightIndex).collect();

        let overridden;
        let selector: &Selector = match ranker_params {
            Some(params) => {
                let ranker = Arc::new(
                    Ranker::build(self.collector.clone(), night_indices.clone(), sites.to_vec(), params, default_band_params())
                        .await,
                );
                overridden = Selector::new(self.collector.clone(), ranker);
                &overridden
            }
            None => &self.selector,
        };

        let selection = selector.select(&night_indices).await?;

        let mut timeline = NightlyTimeline::default();
        for &night in &night_indices {
            for &site in sites {
                self.run_night(night, site, &selection, &mut timeline).await?;
            }
        }

        let summary = StatCalculator::plans_summary(&self.collector, &timeline);
        Ok((timeline, summary))
    }

    /// Runs one site's event loop for one night (`spec.md` §4.6). Builds the
    /// event stream from twilight bookends plus the night's faults/eng
    /// tasks (each paired with a synthetic `ResumeNight` at its resolved
    /// end), re-planning the remainder of the night whenever an event
    /// invalidates prior state, then charges and stats the finished plan.
    async fn run_night(
        &self,
        night: NightIndex,
        site: Site,
        selection: &Selection,
        timeline: &mut NightlyTimeline,
    ) -> Result<(), SchedError> {
        let date = self.collector.date_for_night(night);
        let night_events =
            self.collector.night_events.get_or_compute(site, date, self.collector.time_slot_length, self.collector.twilight_bound_deg);

        let Some(&evening_twilight) = night_events.times.first() else {
            log::warn!("night {night} at {site}: no time slots computed, skipping");
            return Ok(());
        };
        let num_slots = u32::try_from(night_events.num_slots()).unwrap_or(u32::MAX);
        let morning_twilight =
            evening_twilight + self.collector.time_slot_length * i32::try_from(num_slots).unwrap_or(i32::MAX);

        let mut queue = EventQueue::new();
        queue.push(Event { site, kind: EventKind::EveningTwilight, at: evening_twilight });
        queue.push(Event { site, kind: EventKind::MorningTwilight, at: morning_twilight });

        for fault in self.collector.resource_service.get_faults(site, date).await {
            queue.push(Event {
                site,
                kind: EventKind::Fault(Blockage { start: fault.start, end: fault.end, affects: fault.affects.clone() }),
                at: fault.start,
            });
            if let Some(end) = fault.end {
                queue.push(Event { site, kind: EventKind::ResumeNight, at: end });
            }
        }
        for task in self.collector.resource_service.get_eng_tasks(site, date).await {
            queue.push(Event {
                site,
                kind: EventKind::EngTask(Blockage { start: task.start, end: task.end, affects: task.affects.clone() }),
                at: task.start,
            });
            if let Some(end) = task.end {
                queue.push(Event { site, kind: EventKind::ResumeNight, at: end });
            }
        }
        for (at, new_conditions) in self.collector.resource_service.weather_changes(site, date).await {
            queue.push(Event { site, kind: EventKind::WeatherChange { new_conditions }, at });
        }

        let night_plan = Plan::new(site, evening_twilight, morning_twilight, self.collector.time_slot_length, num_slots);
        let mut plans = Plans { night, by_site: HashMap::from([(site, night_plan)]) };
        let mut optimizer = GreedyMaxOptimizer::new();
        let mut blocked: HashSet<Resource> = HashSet::new();
        let mut time_loss = chrono::TimeDelta::zero();

        while let Some(event) = queue.pop() {
            let idx = time_to_slots(self.collector.time_slot_length, event.at - evening_twilight).min(num_slots);
            let is_bootstrap = matches!(event.kind, EventKind::EveningTwilight);

            match &event.kind {
                EventKind::Fault(b) | EventKind::EngTask(b) => {
                    blocked.extend(b.affects.iter().cloned());
                    time_loss += b.time_loss(event.at);
                }
                EventKind::ResumeNight => blocked.clear(),
                EventKind::WeatherChange { .. } | EventKind::MorningTwilight | EventKind::EveningTwilight => {}
            }

            let plan_generated = if is_bootstrap || event.kind.invalidates_plan() {
                if let Some(plan) = plans.by_site.get_mut(&site) {
                    plan.truncate_from(TimeslotIndex(idx));
                }
                optimizer.setup_excluding(selection, &blocked);
                optimizer.schedule_window(&mut plans, Interval { start_time_slot: idx, end_time_slot: num_slots });
                plans.by_site.get(&site).cloned()
            } else {
                None
            };

            timeline.add(night, site, TimelineEntry { start_time_slot: TimeslotIndex(idx), event, plan_generated });
        }

        if let Some(mut final_plan) = timeline.final_plan(night, site) {
            accounting::charge_night(&self.collector, &final_plan, None)?;
            StatCalculator::compute_night_stats(&mut final_plan, &self.collector, time_loss);
            Self::attach_final_night_stats(timeline, night, site, final_plan.night_stats.unwrap_or_default());
        }

        Ok(())
    }

    /// Attaches the night's computed [`NightStats`] to the latest
    /// `plan_generated` timeline entry, the convention
    /// [`NightlyTimeline::final_plan`] itself reads stats from when
    /// stitching together the night's reported plan.
    fn attach_final_night_stats(timeline: &mut NightlyTimeline, night: NightIndex, site: Site, stats: NightStats) {
        if let Some(entry) = timeline
            .timeline
            .get_mut(&night.0)
            .and_then(|by_site| by_site.get_mut(&site))
            .and_then(|entries| entries.iter_mut().rev().find(|e| e.plan_generated.is_some()))
        {
            if let Some(plan) = entry.plan_generated.as_mut() {
                plan.night_stats = Some(stats);
            }
        }
    }
}
