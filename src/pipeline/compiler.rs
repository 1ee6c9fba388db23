use super::compiled_plan::{PlanStats, StreamPlan};
use super::id::{EntityId, LinkId};
use super::pad::Link;
use super::slot::EntitySlot;
use std::collections::VecDeque;
use std::sync::Arc;

/// Compiles the pipeline of one endpoint into a stream plan
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compute the pipeline that feeds `endpoint`.
    ///
    /// Walks upstream from the endpoint through enabled links. Links leaving an
    /// EXTERNAL source pad are part of the plan but their source entity is not
    /// entered; it streams through its own plan. The endpoint's own enabled
    /// outgoing links are part of the plan too.
    ///
    /// # Arguments
    /// * `endpoint` - Entity the pipeline is computed for
    /// * `entities` - All entity slots of the graph (destroyed ones are `None`)
    /// * `links` - All link slots of the graph
    /// * `generation` - Graph generation the plan is valid for
    pub fn compile(
        endpoint: EntityId,
        entities: &[Option<Arc<EntitySlot>>],
        links: &[Option<Link>],
        generation: u64,
    ) -> StreamPlan {
        let start_time = std::time::Instant::now();
        let n = entities.len();

        let mut in_plan = vec![false; n];
        let mut plan_links: Vec<LinkId> = Vec::new();

        if endpoint.index() < n && entities[endpoint.index()].is_some() {
            in_plan[endpoint.index()] = true;

            // Outgoing links of the endpoint itself
            for link in links.iter().flatten() {
                if link.is_enabled() && link.source.entity() == endpoint {
                    plan_links.push(link.id);
                }
            }

            // Upstream DFS
            let mut stack = vec![endpoint];
            while let Some(current) = stack.pop() {
                for link in links.iter().flatten() {
                    if !link.is_enabled() || link.sink.entity() != current {
                        continue;
                    }
                    if !plan_links.contains(&link.id) {
                        plan_links.push(link.id);
                    }

                    let source = link.source.entity();
                    if Self::is_external_source(entities, link) {
                        continue;
                    }
                    if source.index() < n && !in_plan[source.index()] {
                        in_plan[source.index()] = true;
                        stack.push(source);
                    }
                }
            }
        }

        plan_links.sort();
        let (order, producers) = Self::topological_sort(entities, links, &plan_links, &in_plan);

        let stats = PlanStats {
            total_entities: entities.iter().flatten().count(),
            plan_entities: order.len(),
            plan_links: plan_links.len(),
            producers,
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        StreamPlan {
            endpoint,
            entities: order,
            links: plan_links,
            generation,
            stats,
        }
    }

    fn is_external_source(entities: &[Option<Arc<EntitySlot>>], link: &Link) -> bool {
        entities
            .get(link.source.entity().index())
            .and_then(|slot| slot.as_ref())
            .and_then(|slot| slot.pad(link.source.pad_index()))
            .is_some_and(|pad| pad.flags.is_external())
    }

    /// Kahn's algorithm over plan entities, restricted to plan links.
    /// Returns the order and the number of entities with no upstream link.
    fn topological_sort(
        entities: &[Option<Arc<EntitySlot>>],
        links: &[Option<Link>],
        plan_links: &[LinkId],
        in_plan: &[bool],
    ) -> (Vec<EntityId>, usize) {
        let n = entities.len();
        let mut adj = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for link_id in plan_links {
            let Some(Some(link)) = links.get(link_id.index()) else {
                continue;
            };
            let from = link.source.entity().index();
            let to = link.sink.entity().index();
            if from < n && to < n && in_plan[from] && in_plan[to] {
                adj[from].push(to);
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n)
            .filter(|&i| in_plan[i] && in_degree[i] == 0)
            .collect();
        let producers = queue.len();
        let mut result = Vec::new();

        while let Some(node) = queue.pop_front() {
            result.push(EntityId(node as u32));

            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        (result, producers)
    }
}
