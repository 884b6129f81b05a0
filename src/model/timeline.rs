//! [`TimelineEntry`] / [`NightlyTimeline`]: the event-ordered record of a
//! night's (partial-plan, event) pairs, and the stable wire format produced
//! by [`NightlyTimeline::to_json`] (`spec.md` §6).

use super::plan::Plan;
use super::site::Site;
use super::units::{NightIndex, TimeslotIndex};
use crate::events::Event;
use std::collections::BTreeMap;

/// One entry in a night's timeline: which time slot the triggering event
/// landed on, the event itself, and the partial plan it produced (`None`
/// when the event did not invalidate prior state enough to re-plan).
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub start_time_slot: TimeslotIndex,
    pub event: Event,
    pub plan_generated: Option<Plan>,
}

/// A collection of timeline entries per night and site.
#[derive(Debug, Clone, Default)]
pub struct NightlyTimeline {
    pub timeline: BTreeMap<u32, BTreeMap<Site, Vec<TimelineEntry>>>,
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

impl NightlyTimeline {
    pub fn add(&mut self, night_idx: NightIndex, site: Site, entry: TimelineEntry) {
        self.timeline.entry(night_idx.0).or_default().entry(site).or_default().push(entry);
    }

    /// Reverse-merges the night's partial plans into one final plan, per
    /// `spec.md` §4.6: walk entries in reverse, truncating any visit a
    /// later event's time slot cuts mid-execution, then concatenate in
    /// forward order.
    #[must_use]
    pub fn final_plan(&self, night_idx: NightIndex, site: Site) -> Option<Plan> {
        let entries = self.timeline.get(&night_idx.0)?.get(&site)?;
        let relevant: Vec<&TimelineEntry> =
            entries.iter().rev().filter(|e| e.plan_generated.is_some()).collect();
        if relevant.is_empty() {
            return None;
        }

        let mut all_generated = Vec::new();
        let mut t: u32 = 0;
        for entry in &relevant {
            let pg = entry.plan_generated.as_ref().expect("filtered to Some above");
            let mut partial_visits = if t > 0 { pg.slice_before(TimeslotIndex(t)) } else { pg.visits.clone() };

            if let Some(last_visit) = partial_visits.last_mut() {
                let last_start = last_visit.start_time_slot.0;
                let last_end = last_visit.end_time_slot().0;
                if t > 0 && last_start <= t && t < last_end {
                    last_visit.time_slots = t - last_start;
                }
            }

            for v in partial_visits.into_iter().rev() {
                if v.time_slots > 0 {
                    all_generated.push(v);
                }
            }
            if t < entry.start_time_slot.0 {
                t = entry.start_time_slot.0;
            }
        }

        let first = relevant[0].plan_generated.as_ref().unwrap();
        let last = relevant[relevant.len() - 1].plan_generated.as_ref().unwrap();
        let mut plan = Plan::new(site, first.start, last.end, first.time_slot_length, last.num_slots());
        plan.visits = all_generated.into_iter().rev().collect();
        plan.night_stats = last.night_stats.clone();
        Some(plan)
    }

    /// Serializes the timeline to the stable wire schema from `spec.md` §6.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut nights = serde_json::Map::new();
        for (night_idx, by_site) in &self.timeline {
            let mut sites = serde_json::Map::new();
            for (site, entries) in by_site {
                let entries_json: Vec<serde_json::Value> = entries.iter().map(Self::entry_json).collect();
                sites.insert(site.to_string(), serde_json::Value::Array(entries_json));
            }
            nights.insert(night_idx.to_string(), serde_json::Value::Object(sites));
        }
        serde_json::Value::Object(nights)
    }

    fn entry_json(entry: &TimelineEntry) -> serde_json::Value {
        let event_json = serde_json::json!({
            "site": entry.event.site.to_string(),
            "time": entry.event.time().format(DATETIME_FORMAT).to_string(),
            "description": entry.event.description(),
        });
        let plan_json = entry.plan_generated.as_ref().map_or(serde_json::json!({}), |plan| {
            let visits: Vec<serde_json::Value> = plan
                .visits
                .iter()
                .map(|v| {
                    serde_json::json!({
                        "startTime": (plan.start + i64::from(v.start_time_slot.0) * plan.time_slot_length)
                            .format(DATETIME_FORMAT).to_string(),
                        "endTime": (plan.start + i64::from(v.end_time_slot().0) * plan.time_slot_length)
                            .format(DATETIME_FORMAT).to_string(),
                        "obsId": v.obs_id.to_string(),
                        "atomStartIdx": v.atom_start_idx,
                        "atomEndIdx": v.atom_end_idx,
                        "score": v.score,
                    })
                })
                .collect();
            let night_stats = plan.night_stats.as_ref().map_or(serde_json::json!({}), |ns| {
                serde_json::json!({
                    "timeLoss": ns.time_loss.num_minutes(),
                    "planScore": ns.plan_score,
                    "completionFraction": ns.completion_fraction.iter()
                        .map(|(b, n)| (b.to_string(), *n)).collect::<BTreeMap<_, _>>(),
                    "programCompletion": ns.program_completion,
                })
            });
            serde_json::json!({
                "start": plan.start.format(DATETIME_FORMAT).to_string(),
                "end": plan.end.format(DATETIME_FORMAT).to_string(),
                "site": plan.site.to_string(),
                "visits": visits,
                "nightStats": night_stats,
            })
        });
        serde_json::json!({
            "startTimeSlot": entry.start_time_slot.0,
            "event": event_json,
            "plan": plan_json,
        })
    }
}
