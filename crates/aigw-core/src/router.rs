//! Per-request routing
//!
//! Resolves one request against one immutable table snapshot: alias
//! first, then domain match filtered by headroom, in stable
//! registration order. Verifies the selected backend advertises what
//! the request needs and applies the configured mismatch policy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::event::RouteReason;
use crate::models::domain::Domain;
use crate::table::{RoutingEntry, RoutingTable};

/// What to do when the caller wants streaming but the backend cannot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Buffer the backend's batch response and emit it as one `delta`
    /// followed by `done`
    #[default]
    Downgrade,
    /// Reject with a typed `capability_mismatch` error
    Reject,
}

/// What a request asks of the router.
#[derive(Debug, Clone, Default)]
pub struct RouteQuery {
    /// Explicit model or alias name, if the caller named one
    pub model: Option<String>,
    /// Requested or inferred capability domain
    pub domain: Option<Domain>,
    /// Whether the caller asked for a streamed response
    pub want_stream: bool,
}

/// The routing decision for one request.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// Selected backend entry
    pub entry: Arc<RoutingEntry>,
    /// Model the relay will request
    pub model: String,
    /// Why this backend was selected
    pub reason: RouteReason,
    /// Whether the relay must buffer a batch response into a single
    /// delta (streaming downgrade)
    pub downgrade: bool,
}

/// Resolve `query` against `table`.
pub fn route(
    table: &RoutingTable,
    query: &RouteQuery,
    policy: MismatchPolicy,
) -> Result<RouteDecision, GatewayError> {
    select(table, query, policy, None)
}

/// Resolve `query`, skipping the backend a previous attempt failed on.
/// Used for the single reroute after a connect failure.
pub fn route_excluding(
    table: &RoutingTable,
    query: &RouteQuery,
    policy: MismatchPolicy,
    exclude: &str,
) -> Result<RouteDecision, GatewayError> {
    select(table, query, policy, Some(exclude))
}

fn select(
    table: &RoutingTable,
    query: &RouteQuery,
    policy: MismatchPolicy,
    exclude: Option<&str>,
) -> Result<RouteDecision, GatewayError> {
    // Alias match takes priority and is never silently rerouted: if
    // the alias target is down, the request fails rather than landing
    // on a backend the operator did not name.
    if let Some(name) = &query.model {
        if let Some(entry) = table.resolve_alias(name) {
            if !entry.is_eligible() || !entry.has_headroom() || exclude == Some(entry.name()) {
                return Err(GatewayError::NoCapableBackend(
                    query.domain.clone().unwrap_or_else(|| Domain::from(name.as_str())),
                ));
            }
            let alias = entry
                .aliases
                .iter()
                .find(|a| &a.name == name)
                .and_then(|a| a.model.clone());
            return finish(
                entry.clone(),
                alias.unwrap_or_else(|| name.clone()),
                RouteReason::Alias,
                query,
                policy,
            );
        }
    }

    let domain = query
        .domain
        .clone()
        .ok_or_else(|| GatewayError::InvalidRequest(
            "request names neither a known alias nor a capability domain".to_string(),
        ))?;

    let reason = if exclude.is_some() {
        RouteReason::Reroute
    } else {
        RouteReason::Domain
    };

    for entry in table.eligible_for(&domain) {
        if exclude == Some(entry.name()) {
            continue;
        }
        let model = query.model.clone().unwrap_or_else(|| {
            entry
                .descriptor
                .as_ref()
                .map(|d| d.service.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| entry.name().to_string())
        });
        return finish(entry, model, reason, query, policy);
    }

    Err(GatewayError::NoCapableBackend(domain))
}

fn finish(
    entry: Arc<RoutingEntry>,
    model: String,
    reason: RouteReason,
    query: &RouteQuery,
    policy: MismatchPolicy,
) -> Result<RouteDecision, GatewayError> {
    let downgrade = if query.want_stream && !entry.streaming() {
        match policy {
            MismatchPolicy::Downgrade => true,
            MismatchPolicy::Reject => {
                return Err(GatewayError::CapabilityMismatch {
                    backend: entry.name().to_string(),
                    capability: "streaming".to_string(),
                })
            }
        }
    } else {
        false
    };

    Ok(RouteDecision {
        entry,
        model,
        reason,
        downgrade,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::entry;
    use crate::table::{Alias, RoutingTableBuilder};

    fn chat_query() -> RouteQuery {
        RouteQuery {
            model: None,
            domain: Some(Domain::Chat),
            want_stream: true,
        }
    }

    #[test]
    fn test_domain_match_picks_oldest_eligible() {
        let mut b = RoutingTableBuilder::new(1);
        b.push(entry("second", &[Domain::Chat], true, true, 5));
        b.push(entry("first", &[Domain::Chat], true, true, 1));
        let table = b.build();

        let d = route(&table, &chat_query(), MismatchPolicy::Downgrade).unwrap();
        assert_eq!(d.entry.name(), "first");
        assert_eq!(d.reason, RouteReason::Domain);
    }

    #[test]
    fn test_no_capable_backend_is_typed() {
        let mut b = RoutingTableBuilder::new(1);
        b.push(entry("images", &[Domain::Image], false, false, 0));
        let table = b.build();

        let err = route(
            &table,
            &RouteQuery {
                model: None,
                domain: Some(Domain::Image),
                want_stream: false,
            },
            MismatchPolicy::Downgrade,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::NoCapableBackend(Domain::Image)));
    }

    #[test]
    fn test_alias_beats_domain_order() {
        let mut b = RoutingTableBuilder::new(1);
        b.push(entry("first", &[Domain::Chat], true, true, 1));
        let mut aliased = entry("pinned", &[Domain::Chat], true, true, 9);
        aliased.aliases.push(Alias {
            name: "fast-chat".to_string(),
            backend: "pinned".to_string(),
            model: Some("llama3:8b".to_string()),
        });
        b.push(aliased);
        let table = b.build();

        let q = RouteQuery {
            model: Some("fast-chat".to_string()),
            domain: Some(Domain::Chat),
            want_stream: true,
        };
        let d = route(&table, &q, MismatchPolicy::Downgrade).unwrap();
        assert_eq!(d.entry.name(), "pinned");
        assert_eq!(d.model, "llama3:8b");
        assert_eq!(d.reason, RouteReason::Alias);
    }

    #[test]
    fn test_alias_with_unhealthy_target_never_reroutes() {
        let mut b = RoutingTableBuilder::new(1);
        b.push(entry("other", &[Domain::Chat], true, true, 1));
        let mut aliased = entry("down", &[Domain::Chat], false, false, 0);
        aliased.aliases.push(Alias {
            name: "fast-chat".to_string(),
            backend: "down".to_string(),
            model: None,
        });
        b.push(aliased);
        let table = b.build();

        let q = RouteQuery {
            model: Some("fast-chat".to_string()),
            domain: Some(Domain::Chat),
            want_stream: false,
        };
        let err = route(&table, &q, MismatchPolicy::Downgrade).unwrap_err();
        assert!(matches!(err, GatewayError::NoCapableBackend(_)));
    }

    #[test]
    fn test_reject_policy_on_streaming_mismatch() {
        let mut b = RoutingTableBuilder::new(1);
        let mut e = entry("batchy", &[Domain::Chat], true, true, 0);
        if let Some(d) = e.descriptor.as_mut() {
            d.streaming = false;
        }
        b.push(e);
        let table = b.build();

        let err = route(&table, &chat_query(), MismatchPolicy::Reject).unwrap_err();
        assert!(matches!(err, GatewayError::CapabilityMismatch { .. }));

        let d = route(&table, &chat_query(), MismatchPolicy::Downgrade).unwrap();
        assert!(d.downgrade);
    }

    #[test]
    fn test_reroute_excludes_failed_backend() {
        let mut b = RoutingTableBuilder::new(1);
        b.push(entry("a", &[Domain::Chat], true, true, 1));
        b.push(entry("b", &[Domain::Chat], true, true, 2));
        let table = b.build();

        let d = route_excluding(&table, &chat_query(), MismatchPolicy::Downgrade, "a").unwrap();
        assert_eq!(d.entry.name(), "b");
        assert_eq!(d.reason, RouteReason::Reroute);
    }

    #[test]
    fn test_unknown_name_without_domain_is_invalid() {
        let table = RoutingTableBuilder::new(1).build();
        let q = RouteQuery {
            model: Some("ghost".to_string()),
            domain: None,
            want_stream: false,
        };
        let err = route(&table, &q, MismatchPolicy::Downgrade).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }
}
