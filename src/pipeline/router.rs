//! Frame propagation.
//!
//! The router holds the links of every active pipeline, keyed by source pad.
//! `propagate` is a plain call stack: each sink entity processes the frame
//! and propagates its own output before `propagate` returns, so a frame has
//! reached every endpoint by the time the producer regains control. Nothing
//! is queued and nothing is retried.

use crate::pipeline::id::{LinkId, PadId};
use crate::pipeline::slot::EntitySlot;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Router shared by the graph and every producer task.
pub type SharedRouter = Arc<RwLock<Router>>;

struct Route {
    link: LinkId,
    sink_pad: PadId,
    sink: Arc<EntitySlot>,
}

/// An activated link, resolved to the slot that owns its sink pad.
pub struct RouteSpec {
    pub link: LinkId,
    pub source: PadId,
    pub sink: PadId,
    pub slot: Arc<EntitySlot>,
}

#[derive(Default)]
pub struct Router {
    routes: HashMap<PadId, Vec<Route>>,
    /// Active pipelines using each link.
    users: HashMap<LinkId, usize>,
}

impl Router {
    pub fn shared() -> SharedRouter {
        Arc::new(RwLock::new(Router::default()))
    }

    /// Add one pipeline's hold on each link, routing it on first use.
    pub fn activate(&mut self, specs: Vec<RouteSpec>) {
        for spec in specs {
            let users = self.users.entry(spec.link).or_insert(0);
            *users += 1;
            if *users == 1 {
                tracing::debug!(
                    "Route {:?}: {:?} -> {:?} active",
                    spec.link,
                    spec.source,
                    spec.sink
                );
                self.routes.entry(spec.source).or_default().push(Route {
                    link: spec.link,
                    sink_pad: spec.sink,
                    sink: spec.slot,
                });
            }
        }
    }

    /// Drop one pipeline's hold on each link, unrouting it on last use.
    pub fn deactivate(&mut self, links: &[LinkId]) {
        for link in links {
            let Some(users) = self.users.get_mut(link) else {
                continue;
            };
            *users -= 1;
            if *users > 0 {
                continue;
            }
            self.users.remove(link);
            for routes in self.routes.values_mut() {
                routes.retain(|r| r.link != *link);
            }
            self.routes.retain(|_, routes| !routes.is_empty());
            tracing::debug!("Route {:?} inactive", link);
        }
    }

    pub fn is_active(&self, link: LinkId) -> bool {
        self.users.contains_key(&link)
    }

    pub fn active_links(&self) -> usize {
        self.users.len()
    }

    /// Deliver `frame` to the sink of every active link leaving `source_pad`.
    pub fn propagate(&self, source_pad: PadId, frame: &[u8]) {
        let Some(routes) = self.routes.get(&source_pad) else {
            return;
        };
        for route in routes {
            route.sink.process_frame(Some(route.sink_pad), frame, self);
        }
    }
}
