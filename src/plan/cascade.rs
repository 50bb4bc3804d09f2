//! cascade.rs
//! Expands a hierarchy and settings into an ordered, immutable list of jobs.

use super::error::PlanError;
use super::stage::{JobId, Stage};
use crate::cache;
use crate::error::CascadeError;
use crate::hierarchy::{DrillStart, LocationHierarchy, LocationId};
use crate::settings::{ConfigurationError, DrillMode, DrillStartSetting, ModelBuilder, Settings};
use log::info;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

/// Everything a job needs to know about its location.
#[derive(Debug, Clone)]
pub struct LocationWork {
    pub location: LocationId,
    /// The estimated location whose fit seeds this one. `None` where the plan starts.
    pub parent: Option<LocationId>,
    /// Children in the hierarchy, which get random effects in this location's model.
    pub children: Vec<LocationId>,
    pub is_drill_target: bool,
    pub settings: Arc<Settings>,
    /// Hash of the settings, shared by every job of one plan.
    pub fingerprint: u64,
}

#[derive(Debug, Clone)]
pub struct CascadePlan {
    graph: DiGraph<JobId, ()>,
    order: Vec<JobId>,
    work: HashMap<LocationId, LocationWork>,
    /// Locations in the order they are first scheduled.
    locations: Vec<LocationId>,
}

fn drill_start(setting: &Option<DrillStartSetting>) -> Result<DrillStart, ConfigurationError> {
    match setting {
        None => Ok(DrillStart::Level(1)),
        Some(DrillStartSetting::Level(level)) => Ok(DrillStart::Level(*level)),
        Some(DrillStartSetting::Named(name)) if name == "most_detailed" => Ok(DrillStart::MostDetailed),
        Some(DrillStartSetting::Named(name)) => Err(ConfigurationError::Invalid {
            path: "model.drill_location_start".into(),
            reason: format!("expected a level number or 'most_detailed', found '{}'", name),
        }),
    }
}

impl CascadePlan {
    /// Validates the settings and lays out every job.
    ///
    /// A full cascade schedules all stages for every location. A drill
    /// schedules the path from the start level down to the drill location and
    /// saves predictions only there.
    pub fn build(hierarchy: &LocationHierarchy, settings: Arc<Settings>) -> Result<Self, CascadeError> {
        ModelBuilder::new(&settings, hierarchy).validate()?;
        let fingerprint = cache::fingerprint(settings.as_ref())
            .map_err(|source| CascadeError::Parse { what: "settings".into(), source })?;

        // (location, parent in the plan, is target)
        let mut spine: Vec<(LocationId, Option<LocationId>, bool)> = Vec::new();
        match settings.model.drill {
            DrillMode::Cascade => {
                for location in hierarchy.node_order() {
                    spine.push((location, hierarchy.parent_of(location)?, true));
                }
            }
            DrillMode::Drill => {
                let target = settings.model.drill_location.map(LocationId).ok_or_else(|| {
                    ConfigurationError::Invalid {
                        path: "model.drill_location".into(),
                        reason: "a drill needs a location".into(),
                    }
                })?;
                if !hierarchy.contains(target) {
                    return Err(ConfigurationError::UnknownLocation {
                        path: "model.drill_location".into(),
                        location: target.0,
                    }
                    .into());
                }
                let start = drill_start(&settings.model.drill_location_start)?;
                let path = hierarchy
                    .drill_path(target, start)
                    .map_err(|source| ConfigurationError::Drill { source })?;
                let mut previous = None;
                for location in path {
                    spine.push((location, previous, location == target));
                    previous = Some(location);
                }
            }
        }

        let mut graph: DiGraph<JobId, ()> = DiGraph::new();
        let mut index: HashMap<JobId, NodeIndex> = HashMap::new();
        let mut work = HashMap::with_capacity(spine.len());
        let mut locations = Vec::with_capacity(spine.len());

        for (location, parent, is_target) in &spine {
            let mut previous: Option<NodeIndex> = None;
            for stage in Stage::ALL {
                if stage == Stage::SavePredictions && !is_target {
                    continue;
                }
                let job = JobId::new(stage, *location);
                let node = graph.add_node(job);
                index.insert(job, node);
                if let Some(prev) = previous {
                    graph.add_edge(prev, node, ());
                }
                previous = Some(node);
            }
            locations.push(*location);
            work.insert(
                *location,
                LocationWork {
                    location: *location,
                    parent: *parent,
                    children: hierarchy.children_of(*location)?,
                    is_drill_target: *is_target,
                    settings: Arc::clone(&settings),
                    fingerprint,
                },
            );
        }

        for (location, parent, _) in &spine {
            let Some(parent) = parent else { continue };
            let parent_fit = index[&JobId::new(Stage::InitialFit, *parent)];
            for stage in [Stage::InitialGuess, Stage::Draws] {
                graph.add_edge(parent_fit, index[&JobId::new(stage, *location)], ());
            }
        }

        let rank: HashMap<LocationId, usize> = locations.iter().enumerate().map(|(i, l)| (*l, i)).collect();
        let order = Self::topological_order(&graph, &rank)?;
        info!("Planned {} jobs over {} locations", order.len(), locations.len());
        Ok(Self { graph, order, work, locations })
    }

    /// Kahn's algorithm. Among ready jobs the earliest location goes first,
    /// then the earliest stage, so the order is deterministic.
    fn topological_order(
        graph: &DiGraph<JobId, ()>,
        rank: &HashMap<LocationId, usize>,
    ) -> Result<Vec<JobId>, PlanError> {
        let count = graph.node_count();
        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let key = |n: NodeIndex| {
            let job = graph[n];
            Reverse((rank.get(&job.location).copied().unwrap_or(usize::MAX), job.stage, n.index()))
        };

        let mut ready = BinaryHeap::with_capacity(count);
        for node in graph.node_indices() {
            if in_degree[node.index()] == 0 {
                ready.push(key(node));
            }
        }

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse((_, _, idx))) = ready.pop() {
            let node = NodeIndex::new(idx);
            order.push(graph[node]);
            for child in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    ready.push(key(child));
                }
            }
        }

        if order.len() != count {
            return Err(PlanError::DependencyCycle { scheduled: order.len(), total: count });
        }
        Ok(order)
    }

    /// Every job, dependencies first.
    pub fn jobs(&self) -> &[JobId] { &self.order }

    pub fn locations(&self) -> &[LocationId] { &self.locations }

    pub fn work(&self, location: LocationId) -> Option<&LocationWork> { self.work.get(&location) }

    pub fn contains(&self, job: &JobId) -> bool {
        self.work.contains_key(&job.location)
            && (job.stage != Stage::SavePredictions || self.work[&job.location].is_drill_target)
    }

    /// Resolves a job identifier from this plan to its stage and location.
    pub fn job_for(&self, identifier: &str) -> Result<(Stage, &LocationWork), PlanError> {
        let job: JobId = identifier.parse()?;
        if !self.contains(&job) {
            return Err(PlanError::UnknownJob(identifier.to_string()));
        }
        let work = self.work.get(&job.location).ok_or_else(|| PlanError::UnknownJob(identifier.to_string()))?;
        Ok((job.stage, work))
    }

    /// Jobs that must finish before `job` starts.
    pub fn dependencies(&self, job: &JobId) -> Vec<JobId> {
        self.graph
            .node_indices()
            .find(|n| self.graph[*n] == *job)
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).map(|p| self.graph[p]).collect())
            .unwrap_or_default()
    }

    /// Locations the plan seeds from `location`'s fit, in scheduling order.
    pub fn plan_children(&self, location: LocationId) -> Vec<LocationId> {
        self.locations
            .iter()
            .copied()
            .filter(|l| self.work.get(l).and_then(|w| w.parent) == Some(location))
            .collect()
    }

    /// Jobs at `location` and at every location planned beneath it.
    pub fn subtree_jobs(&self, location: LocationId) -> Vec<JobId> {
        let mut members = vec![location];
        let mut cursor = 0;
        while cursor < members.len() {
            members.extend(self.plan_children(members[cursor]));
            cursor += 1;
        }
        self.order.iter().copied().filter(|j| members.contains(&j.location)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::LocationRow;
    use serde_json::json;

    fn hierarchy() -> LocationHierarchy {
        LocationHierarchy::build(&[
            LocationRow::new(1, None, "Global"),
            LocationRow::new(2, Some(1), "North"),
            LocationRow::new(3, Some(1), "South"),
            LocationRow::new(4, Some(2), "North East"),
            LocationRow::new(5, Some(2), "North West"),
        ])
        .unwrap()
    }

    fn settings(model: serde_json::Value) -> Arc<Settings> {
        let mut doc = json!({
            "model": {"drill": "cascade", "default_age_grid": [0, 100], "default_time_grid": [1990, 2020]},
            "rate": [{"rate": "iota", "default": {"value": {"density": "uniform", "min": 0, "max": 1, "mean": 0.01}}}]
        });
        if let (Some(m), Some(extra)) = (doc["model"].as_object_mut(), model.as_object()) {
            for (k, v) in extra {
                m.insert(k.clone(), v.clone());
            }
        }
        Arc::new(serde_json::from_value(doc).unwrap())
    }

    fn position(plan: &CascadePlan, stage: Stage, location: i64) -> usize {
        let job = JobId::new(stage, LocationId(location));
        plan.jobs().iter().position(|j| *j == job).unwrap()
    }

    #[test]
    fn test_children_draw_after_parent_fit() {
        let h = hierarchy();
        let plan = CascadePlan::build(&h, settings(json!({}))).unwrap();
        assert_eq!(plan.jobs().len(), 5 * Stage::ALL.len());
        for (child, parent) in [(2, 1), (3, 1), (4, 2), (5, 2)] {
            assert!(position(&plan, Stage::Draws, child) > position(&plan, Stage::InitialFit, parent));
            assert!(position(&plan, Stage::InitialGuess, child) > position(&plan, Stage::InitialFit, parent));
        }
    }

    #[test]
    fn test_stage_order_within_location_is_total() {
        let h = hierarchy();
        let plan = CascadePlan::build(&h, settings(json!({}))).unwrap();
        for location in 1..=5 {
            let positions: Vec<usize> = Stage::ALL.iter().map(|s| position(&plan, *s, location)).collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
        }
        // Breadth-first: the root's jobs come first.
        assert_eq!(plan.jobs()[0], JobId::new(Stage::Setup, LocationId(1)));
        assert_eq!(plan.jobs()[6], JobId::new(Stage::SavePredictions, LocationId(1)));
    }

    #[test]
    fn test_drill_schedules_only_the_path() {
        let h = hierarchy();
        let plan = CascadePlan::build(&h, settings(json!({"drill": "drill", "drill_location": 4}))).unwrap();
        assert_eq!(plan.locations(), &[LocationId(1), LocationId(2), LocationId(4)]);
        assert_eq!(plan.jobs().len(), 3 * 6 + 1);
        let saves: Vec<JobId> = plan.jobs().iter().copied().filter(|j| j.stage == Stage::SavePredictions).collect();
        assert_eq!(saves, vec![JobId::new(Stage::SavePredictions, LocationId(4))]);
        assert!(plan.job_for("estimate_location:save_predictions@2").is_err());
    }

    #[test]
    fn test_drill_start_level_trims_path() {
        let h = hierarchy();
        let plan = CascadePlan::build(
            &h,
            settings(json!({"drill": "drill", "drill_location": 4, "drill_location_start": 2})),
        )
        .unwrap();
        assert_eq!(plan.locations(), &[LocationId(2), LocationId(4)]);
        assert_eq!(plan.work(LocationId(2)).unwrap().parent, None);

        let err = CascadePlan::build(
            &h,
            settings(json!({"drill": "drill", "drill_location": 2, "drill_location_start": 4})),
        )
        .unwrap_err();
        assert!(matches!(err, CascadeError::Configuration(ConfigurationError::Drill { .. })));
    }

    #[test]
    fn test_job_for_resolves_identifiers() {
        let h = hierarchy();
        let plan = CascadePlan::build(&h, settings(json!({}))).unwrap();
        let (stage, work) = plan.job_for("estimate_location:compute_initial_fit@2").unwrap();
        assert_eq!(stage, Stage::InitialFit);
        assert_eq!(work.children, vec![LocationId(4), LocationId(5)]);
        assert_eq!(work.parent, Some(LocationId(1)));
        assert!(matches!(plan.job_for("bundle_setup@99"), Err(PlanError::UnknownJob(_))));
        assert!(matches!(plan.job_for("estimate_location:refit@2"), Err(PlanError::UnknownJob(_))));
    }

    #[test]
    fn test_subtree_jobs_cover_descendants() {
        let h = hierarchy();
        let plan = CascadePlan::build(&h, settings(json!({}))).unwrap();
        let jobs = plan.subtree_jobs(LocationId(2));
        assert_eq!(jobs.len(), 3 * Stage::ALL.len());
        assert!(jobs.iter().all(|j| [2, 4, 5].contains(&j.location.0)));
        let mut deps = plan.dependencies(&JobId::new(Stage::Draws, LocationId(4)));
        deps.sort();
        assert_eq!(
            deps,
            vec![JobId::new(Stage::InitialFit, LocationId(2)), JobId::new(Stage::InitialFit, LocationId(4))]
        );
    }
}
