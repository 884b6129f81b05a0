//! Time accounting (`spec.md` §4.7): once a night's [`Plan`] is finalized,
//! charges each visit's atoms to program/partner time, or routes them to
//! `not_charged` when an event bound cuts execution short.
//!
//! Grounded on `original_source/scheduler/core/stats_calculator/stats_calculator.py`
//! for the completion/summary math (see [`stats`]); the charge-or-not-charge
//! rule itself comes from `spec.md` §4.7, since the original source computes
//! statistics over an already-charged plan rather than performing the charge.

pub mod stats;

use crate::collector::Collector;
use crate::error::AccountingError;
use crate::model::{
    Group, ObsClass, Observation, ObservationID, ObservationStatus, Plan, Program, ProgramID, QAState,
    TimeslotIndex, UniqueGroupID, Visit,
};
use std::collections::{HashMap, HashSet};

/// A maximal run of consecutive visits sharing the same scheduling-group
/// parent, or a single visit with no such parent (`spec.md` §4.7).
struct GroupVisits<'a> {
    parent: Option<UniqueGroupID>,
    visits: Vec<&'a Visit>,
}

/// Maps each observation to the nearest enclosing scheduling group, if any.
/// Nesting is rejected at the Selector, so this lookup is unambiguous.
fn scheduling_group_membership(group: &Group) -> HashMap<ObservationID, UniqueGroupID> {
    fn walk(group: &Group, current: Option<&UniqueGroupID>, out: &mut HashMap<ObservationID, UniqueGroupID>) {
        match group {
            Group::Observation { obs, .. } => {
                if let Some(id) = current {
                    out.insert(obs.id.clone(), id.clone());
                }
            }
            Group::And { id, is_scheduling_group, children } => {
                let next = if *is_scheduling_group { Some(id) } else { current };
                for child in children {
                    walk(child, next, out);
                }
            }
            Group::Or { children, .. } => {
                for child in children {
                    walk(child, current, out);
                }
            }
        }
    }
    let mut out = HashMap::new();
    walk(group, None, &mut out);
    out
}

fn group_consecutive_visits<'a>(
    visits: &'a [Visit],
    membership: &HashMap<ObservationID, UniqueGroupID>,
) -> Vec<GroupVisits<'a>> {
    let mut out: Vec<GroupVisits<'a>> = Vec::new();
    for visit in visits {
        let parent = membership.get(&visit.obs_id).cloned();
        match out.last_mut() {
            Some(last) if parent.is_some() && last.parent == parent => last.visits.push(visit),
            _ => out.push(GroupVisits { parent, visits: vec![visit] }),
        }
    }
    out
}

fn find_observation_mut<'a>(group: &'a mut Group, obs_id: &ObservationID) -> Option<&'a mut Observation> {
    match group {
        Group::Observation { obs, .. } => (obs.id == *obs_id).then(|| obs.as_mut()),
        Group::And { children, .. } | Group::Or { children, .. } => {
            children.iter_mut().find_map(|c| find_observation_mut(c, obs_id))
        }
    }
}

fn find_group_mut<'a>(group: &'a mut Group, id: &UniqueGroupID) -> Option<&'a mut Group> {
    if group.unique_id() == id {
        return Some(group);
    }
    match group {
        Group::And { children, .. } | Group::Or { children, .. } => {
            children.iter_mut().find_map(|c| find_group_mut(c, id))
        }
        Group::Observation { .. } => None,
    }
}

fn observations_mut(group: &mut Group) -> Vec<&mut Observation> {
    match group {
        Group::Observation { obs, .. } => vec![obs.as_mut()],
        Group::And { children, .. } | Group::Or { children, .. } => {
            children.iter_mut().flat_map(observations_mut).collect()
        }
    }
}

/// Charges a single visit's atoms, per `spec.md` §4.7:
///
/// - If `charge_group` and the atom ends at or before `bound` (or there is no
///   bound): `program_used := prog_time`, `partner_used := part_time`,
///   `observed := true`, `qa_state := Pass`. Acquisition overhead is folded
///   into the first charged atom's `program_used` only.
/// - Otherwise, if the atom straddles or follows `bound`: the slots from the
///   atom's start up to and including `bound` go to `not_charged`.
///
/// `visit.end_time_slot()` always acts as an implicit extra bound: a visit
/// already truncated by `NightlyTimeline::final_plan` (e.g. cut short by a
/// later re-plan) must not have atoms past its own recorded end charged,
/// even when the caller passes no explicit `bound`.
///
/// Status becomes `Observed` only if every atom up to the observation's last
/// was charged; otherwise `Ongoing`.
fn charge_visit(program: &mut Program, visit: &Visit, charge_group: bool, bound: Option<TimeslotIndex>, slot_length: chrono::TimeDelta) {
    let Some(obs) = find_observation_mut(&mut program.root_group, &visit.obs_id) else { return };
    let acq_overhead = obs.acq_overhead;
    let is_last_atom_in_sequence = obs.sequence.is_empty() || visit.atom_end_idx + 1 == obs.sequence.len();

    let effective_bound = bound.map_or(visit.end_time_slot().0, |b| b.0.min(visit.end_time_slot().0));

    let mut cumulative_slots = 0u32;
    let mut fully_charged = true;

    for atom_idx in visit.atom_start_idx..=visit.atom_end_idx {
        let Some(atom) = obs.sequence.get_mut(atom_idx) else { continue };
        let atom_slots = crate::model::time_to_slots(slot_length, atom.exec_time).max(1);
        let atom_start = visit.start_time_slot.0 + cumulative_slots;
        let atom_end = atom_start + atom_slots;
        cumulative_slots += atom_slots;

        let ends_before_bound = atom_end <= effective_bound;

        if charge_group && ends_before_bound {
            atom.program_used = atom.prog_time;
            atom.partner_used = atom.part_time;
            if atom_idx == visit.atom_start_idx {
                atom.program_used += acq_overhead;
            }
            atom.observed = true;
            atom.qa_state = QAState::Pass;
        } else {
            fully_charged = false;
            if atom_start <= effective_bound {
                let slots_in_window = (effective_bound - atom_start + 1).min(atom_slots);
                atom.not_charged += slot_length * i32::try_from(slots_in_window).unwrap_or(i32::MAX);
            }
        }
    }

    obs.status =
        if fully_charged && is_last_atom_in_sequence { ObservationStatus::Observed } else { ObservationStatus::Ongoing };
}

/// Un-executed partner-cal observations in a fully-charged scheduling group
/// are dropped from future consideration (`spec.md` §4.7).
fn deactivate_unexecuted_partner_cals(program: &mut Program, charged: &HashSet<UniqueGroupID>) {
    for id in charged {
        let Some(group) = find_group_mut(&mut program.root_group, id) else { continue };
        for obs in observations_mut(group) {
            if obs.obs_class == ObsClass::PartnerCal && !matches!(obs.status, ObservationStatus::Observed) {
                obs.status = ObservationStatus::Inactive;
            }
        }
    }
}

/// Charges one site's finalized night [`Plan`] back onto the programs held
/// by `collector`, per `spec.md` §4.7. `bound`, when given, is the time slot
/// an interrupting event cut the plan off at — visits (or, for scheduling
/// groups, the whole group) entirely before it are charged normally; visits
/// straddling or following it are routed to `not_charged`.
pub fn charge_night(collector: &Collector, plan: &Plan, bound: Option<TimeslotIndex>) -> Result<(), AccountingError> {
    if let Some(b) = bound {
        if b.0 > plan.num_slots() {
            return Err(AccountingError::InvalidBound(format!(
                "bound slot {} exceeds plan length {}",
                b.0,
                plan.num_slots()
            )));
        }
    }

    let mut by_program: HashMap<ProgramID, Vec<Visit>> = HashMap::new();
    for visit in &plan.visits {
        by_program.entry(visit.obs_id.program_id.clone()).or_default().push(visit.clone());
    }

    for (program_id, visits) in by_program {
        let Some(mut program) = collector.program(&program_id) else {
            log::warn!("accounting: no program found for {program_id}, skipping its visits");
            continue;
        };
        let membership = scheduling_group_membership(&program.root_group);
        let groups = group_consecutive_visits(&visits, &membership);

        let mut charged_scheduling_groups: HashSet<UniqueGroupID> = HashSet::new();

        for gv in &groups {
            let charge_group = match &gv.parent {
                Some(_) => {
                    let end = gv.visits.last().map(|v| v.end_time_slot()).unwrap_or(TimeslotIndex(0));
                    bound.is_none_or(|b| b.0 > end.0)
                }
                None => {
                    let start = gv.visits[0].start_time_slot;
                    bound.is_none_or(|b| b.0 > start.0)
                }
            };
            if charge_group {
                if let Some(parent) = &gv.parent {
                    charged_scheduling_groups.insert(parent.clone());
                }
            }
            for visit in &gv.visits {
                charge_visit(&mut program, visit, charge_group, bound, plan.time_slot_length);
            }
        }

        deactivate_unexecuted_partner_cals(&mut program, &charged_scheduling_groups);
        collector.update_program(program);
    }

    Ok(())
}
