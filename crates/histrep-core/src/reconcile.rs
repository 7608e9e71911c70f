// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Point identity reconciliation.
//!
//! Before any data moves, the configured point names are resolved on both
//! historians. The result is an immutable [`PointMap`] from logical name to
//! the source and destination handles, built once at startup and shared
//! read-only with every producer and the dispatch engine.
//!
//! # Algorithm
//!
//! 1. One batched lookup per endpoint.
//! 2. Source failures drop the name.
//! 3. Destination "not found" failures are queued for creation when creation
//!    is allowed and the source resolved the name; any other destination
//!    failure drops the name.
//! 4. One batched creation call for the queued names.
//! 5. The map holds names that resolved on both sides.
//!
//! Per-point failures are logged and tolerated. Reconciliation fails only
//! when an endpoint yields no usable points at all.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::{ReconcileError, ReconcileResult};
use crate::historian::{HistorianClient, LookupFailure, PointLookup};
use crate::types::{PointHandle, PointName, ServerHandle};

// =============================================================================
// Point Identity
// =============================================================================

/// A point resolved on both historians.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointIdentity {
    name: PointName,
    source: PointHandle,
    destination: PointHandle,
}

impl PointIdentity {
    /// Creates a new identity.
    pub fn new(name: PointName, source: PointHandle, destination: PointHandle) -> Self {
        Self {
            name,
            source,
            destination,
        }
    }

    /// Returns the logical name.
    pub fn name(&self) -> &PointName {
        &self.name
    }

    /// Returns the source handle.
    pub fn source(&self) -> &PointHandle {
        &self.source
    }

    /// Returns the destination handle.
    pub fn destination(&self) -> &PointHandle {
        &self.destination
    }
}

/// Name-keyed mapping of resolved points.
///
/// Built once by [`PointReconciler`] and never mutated afterwards, so
/// concurrent readers need no lock.
#[derive(Debug, Clone, Default)]
pub struct PointMap {
    identities: BTreeMap<PointName, PointIdentity>,
}

impl PointMap {
    /// Builds a map from identities. Later duplicates replace earlier ones.
    pub fn from_identities(identities: impl IntoIterator<Item = PointIdentity>) -> Self {
        Self {
            identities: identities
                .into_iter()
                .map(|identity| (identity.name.clone(), identity))
                .collect(),
        }
    }

    /// Returns the identity for a name.
    pub fn get(&self, name: &PointName) -> Option<&PointIdentity> {
        self.identities.get(name)
    }

    /// Returns the destination handle for a name.
    pub fn destination(&self, name: &PointName) -> Option<&PointHandle> {
        self.identities.get(name).map(PointIdentity::destination)
    }

    /// Returns `true` if the name is mapped.
    pub fn contains(&self, name: &PointName) -> bool {
        self.identities.contains_key(name)
    }

    /// Returns the source handles of every mapped point, ordered by name.
    pub fn source_handles(&self) -> Vec<PointHandle> {
        self.identities.values().map(|i| i.source.clone()).collect()
    }

    /// Returns the mapped names in order.
    pub fn names(&self) -> impl Iterator<Item = &PointName> {
        self.identities.keys()
    }

    /// Iterates over identities ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &PointIdentity> {
        self.identities.values()
    }

    /// Returns the number of mapped points.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Returns `true` if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

// =============================================================================
// Report
// =============================================================================

/// Which historian an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The historian data is read from.
    Source,
    /// The historian data is written to.
    Destination,
}

impl Endpoint {
    /// Returns the endpoint label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Source => "source",
            Endpoint::Destination => "destination",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-point outcomes of a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Distinct names requested.
    pub requested: usize,
    /// Names that failed on the source.
    pub source_failures: Vec<LookupFailure>,
    /// Names dropped on the destination without a creation attempt.
    pub destination_failures: Vec<LookupFailure>,
    /// Names created on the destination.
    pub created: Vec<PointName>,
    /// Names whose creation failed.
    pub creation_failures: Vec<LookupFailure>,
}

impl ReconcileReport {
    /// Returns the number of names that were dropped for any reason.
    pub fn dropped(&self) -> usize {
        self.source_failures.len() + self.destination_failures.len() + self.creation_failures.len()
    }
}

/// The outcome of a successful reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The point map.
    pub map: PointMap,
    /// Per-point outcomes.
    pub report: ReconcileReport,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Resolves point names against the source and destination historians.
pub struct PointReconciler {
    source: Arc<dyn HistorianClient>,
    destination: Arc<dyn HistorianClient>,
    allow_create: bool,
}

impl PointReconciler {
    /// Creates a reconciler.
    pub fn new(
        source: Arc<dyn HistorianClient>,
        destination: Arc<dyn HistorianClient>,
        allow_create: bool,
    ) -> Self {
        Self {
            source,
            destination,
            allow_create,
        }
    }

    /// Reconciles `names` and builds the point map.
    ///
    /// # Errors
    ///
    /// - `ReconcileError::EmptyPointList` if `names` is empty
    /// - `ReconcileError::Lookup` if a batched lookup fails as a whole
    /// - `ReconcileError::NoSourcePoints` / `NoDestinationPoints` if an
    ///   endpoint resolves nothing
    /// - `ReconcileError::NoCommonPoints` if no name resolves on both sides
    pub async fn reconcile(
        &self,
        source_server: &ServerHandle,
        destination_server: &ServerHandle,
        names: &[PointName],
    ) -> ReconcileResult<Reconciliation> {
        let mut seen = HashSet::new();
        let names: Vec<PointName> = names
            .iter()
            .filter(|name| seen.insert((*name).clone()))
            .cloned()
            .collect();
        if names.is_empty() {
            return Err(ReconcileError::EmptyPointList);
        }

        let mut report = ReconcileReport {
            requested: names.len(),
            ..Default::default()
        };

        // Source side.
        let source = self
            .source
            .find_points(source_server, &names)
            .await
            .map_err(|source| ReconcileError::Lookup {
                endpoint: Endpoint::Source.as_str(),
                source,
            })?;
        for failure in &source.failures {
            log_failure(Endpoint::Source, source_server, failure);
        }
        report.source_failures = source.failures;

        if source.found.is_empty() {
            error!(server = %source_server, requested = names.len(), "No points were loaded from the source historian");
            return Err(ReconcileError::NoSourcePoints {
                requested: names.len(),
            });
        }

        // Destination side.
        let PointLookup {
            found: mut destination,
            failures,
        } = self
            .destination
            .find_points(destination_server, &names)
            .await
            .map_err(|source| ReconcileError::Lookup {
                endpoint: Endpoint::Destination.as_str(),
                source,
            })?;

        let mut to_create = Vec::new();
        for failure in failures {
            if failure.is_not_found() && self.allow_create {
                if source.found.contains_key(&failure.name) {
                    to_create.push(failure.name);
                } else {
                    debug!(point = %failure.name, "Point missing on both historians, not created");
                }
            } else {
                log_failure(Endpoint::Destination, destination_server, &failure);
                report.destination_failures.push(failure);
            }
        }

        if !to_create.is_empty() {
            info!(
                server = %destination_server,
                count = to_create.len(),
                "Creating missing destination points"
            );
            let created = self
                .destination
                .create_points(destination_server, &to_create)
                .await
                .map_err(|source| ReconcileError::Lookup {
                    endpoint: Endpoint::Destination.as_str(),
                    source,
                })?;

            for failure in &created.failures {
                error!(
                    point = %failure.name,
                    server = %destination_server,
                    endpoint = "destination",
                    message = %failure.message,
                    "Failed to create point"
                );
            }
            report.creation_failures = created.failures;

            for (name, handle) in created.found {
                info!(
                    point = %handle,
                    server = %destination_server,
                    endpoint = "destination",
                    "Created destination point"
                );
                report.created.push(name.clone());
                destination.insert(name, handle);
            }
        }

        if destination.is_empty() {
            error!(server = %destination_server, requested = names.len(), "No points were loaded from the destination historian");
            return Err(ReconcileError::NoDestinationPoints {
                requested: names.len(),
            });
        }

        // Both sides.
        let mut identities = Vec::with_capacity(names.len());
        for name in &names {
            match (source.found.get(name), destination.get(name)) {
                (Some(src), Some(dst)) => {
                    identities.push(PointIdentity::new(name.clone(), src.clone(), dst.clone()));
                }
                (Some(_), None) | (None, Some(_)) => {
                    debug!(point = %name, "Point resolved on only one historian, excluded");
                }
                (None, None) => {}
            }
        }

        let map = PointMap::from_identities(identities);
        if map.is_empty() {
            error!(requested = names.len(), "No point resolved on both historians");
            return Err(ReconcileError::NoCommonPoints {
                requested: names.len(),
            });
        }

        info!(
            mapped = map.len(),
            requested = report.requested,
            dropped = report.dropped(),
            created = report.created.len(),
            "Point reconciliation complete"
        );

        Ok(Reconciliation { map, report })
    }
}

impl fmt::Debug for PointReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointReconciler")
            .field("source", &self.source.name())
            .field("destination", &self.destination.name())
            .field("allow_create", &self.allow_create)
            .finish()
    }
}

fn log_failure(endpoint: Endpoint, server: &ServerHandle, failure: &LookupFailure) {
    error!(
        point = %failure.name,
        path = %failure.name.path_on(server.name()),
        endpoint = %endpoint,
        kind = ?failure.kind,
        message = %failure.message,
        "Failed to load point"
    );
}
