//! Loop and storm prevention for cascading automation rules.
//!
//! An event can trigger a rule whose action emits another event, which
//! triggers another rule, and so on. The chain travels with every rule run
//! of one cascade (serialized into the run's payload across job boundaries)
//! and bounds it three ways:
//!
//! - **depth**: causal hops from the originating event,
//! - **loops**: a rule id already in the chain never fires again,
//! - **breadth**: the total number of rules claimed by the cascade.
//!
//! Siblings triggered by the same event share the parent's depth but see
//! each other in `executed_rule_ids` (see [`AutomationChain::fan_out`]), so
//! depth and breadth grow independently once a cascade branches.
//!
//! A branch only sees the rules on its own path. Branches that converge
//! again (two siblings emitting the same event) are caught by the
//! per-cascade claim ledger keyed by [`AutomationChain::root_at`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Maximum causal depth of a cascade.
pub const MAX_CHAIN_DEPTH: u32 = 3;

/// Maximum number of rules one cascade may fire.
pub const MAX_RULES_PER_CHAIN: usize = 10;

/// Key under which the chain is carried in trigger payloads.
pub const CHAIN_PAYLOAD_KEY: &str = "automation_chain";

/// Configurable caps applied by [`AutomationChain::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLimits {
    pub max_depth: u32,
    pub max_rules: usize,
}

impl Default for ChainLimits {
    fn default() -> Self {
        Self {
            max_depth: MAX_CHAIN_DEPTH,
            max_rules: MAX_RULES_PER_CHAIN,
        }
    }
}

/// Why a rule may not execute in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDenial {
    DepthExceeded { depth: u32, max: u32 },
    LoopDetected { rule_id: Uuid },
    BreadthExceeded { rules: usize, max: usize },
}

impl std::fmt::Display for ChainDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DepthExceeded { depth, max } => {
                write!(f, "chain depth {} reached limit {}", depth, max)
            }
            Self::LoopDetected { rule_id } => {
                write!(f, "rule {} already executed in this chain", rule_id)
            }
            Self::BreadthExceeded { rules, max } => {
                write!(f, "chain already fired {} rules (limit {})", rules, max)
            }
        }
    }
}

/// Bookkeeping for one cascade of rule firings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationChain {
    pub depth: u32,
    pub executed_rule_ids: BTreeSet<Uuid>,
    pub origin_event_id: Option<Uuid>,
    /// First run of a cascade that started without an event (schedule or
    /// manual trigger).
    #[serde(default)]
    pub root_run_id: Option<Uuid>,
}

impl AutomationChain {
    /// A fresh chain: the unit holding it is itself an origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `rule_id` may execute under the default limits.
    pub fn can_execute(&self, rule_id: Uuid) -> bool {
        self.check(rule_id, &ChainLimits::default()).is_ok()
    }

    /// Evaluate the chain predicate, reporting why a rule is denied.
    pub fn check(&self, rule_id: Uuid, limits: &ChainLimits) -> Result<(), ChainDenial> {
        if self.depth >= limits.max_depth {
            return Err(ChainDenial::DepthExceeded {
                depth: self.depth,
                max: limits.max_depth,
            });
        }
        if self.executed_rule_ids.contains(&rule_id) {
            return Err(ChainDenial::LoopDetected { rule_id });
        }
        if self.executed_rule_ids.len() >= limits.max_rules {
            return Err(ChainDenial::BreadthExceeded {
                rules: self.executed_rule_ids.len(),
                max: limits.max_rules,
            });
        }
        Ok(())
    }

    /// Record that `rule_id` executed because of `triggering_event_id`.
    ///
    /// The origin is written once, by the first execution of the chain.
    pub fn record_execution(&mut self, rule_id: Uuid, triggering_event_id: Option<Uuid>) {
        self.depth += 1;
        self.executed_rule_ids.insert(rule_id);
        if self.origin_event_id.is_none() {
            self.origin_event_id = triggering_event_id;
        }
    }

    /// Identify the cascade this chain belongs to, shared by all of its
    /// branches: the root run when the cascade started without an event,
    /// otherwise the origin event. A chain with neither is rooted at
    /// `run_id`.
    pub fn root_at(&mut self, run_id: Uuid) -> Uuid {
        if let Some(root) = self.root_run_id {
            return root;
        }
        if let Some(origin) = self.origin_event_id {
            return origin;
        }
        self.root_run_id = Some(run_id);
        run_id
    }

    /// Count rules claimed downstream of this chain, so later dispatches
    /// from the same run see them.
    pub fn extend_claimed(&mut self, rule_ids: impl IntoIterator<Item = Uuid>) {
        self.executed_rule_ids.extend(rule_ids);
    }

    /// Split this chain across the rules one event triggers.
    ///
    /// Each accepted sibling receives an inbound chain at this chain's depth
    /// whose executed set also holds the siblings accepted before it. The
    /// returned chains have not recorded their own rule yet; the executor
    /// does that when the run starts.
    pub fn fan_out(&self, rule_ids: &[Uuid], limits: &ChainLimits) -> FanOut {
        let mut claimed = self.executed_rule_ids.clone();
        let mut fan_out = FanOut::default();

        for &rule_id in rule_ids {
            let inbound = Self {
                depth: self.depth,
                executed_rule_ids: claimed.clone(),
                origin_event_id: self.origin_event_id,
                root_run_id: self.root_run_id,
            };
            match inbound.check(rule_id, limits) {
                Ok(()) => {
                    claimed.insert(rule_id);
                    fan_out.accepted.push((rule_id, inbound));
                }
                Err(denial) => fan_out.denied.push((rule_id, denial)),
            }
        }

        fan_out
    }

    /// Serialize for a downstream unit's trigger payload.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "depth": self.depth,
            "executed_rule_ids": self.executed_rule_ids,
            "origin_event_id": self.origin_event_id,
            "root_run_id": self.root_run_id,
        })
    }

    /// Restore from a trigger payload; no payload means a fresh chain.
    pub fn from_payload(payload: Option<&serde_json::Value>) -> DomainResult<Self> {
        match payload {
            None | Some(serde_json::Value::Null) => Ok(Self::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                DomainError::SerializationError(format!("invalid automation chain payload: {}", e))
            }),
        }
    }

    /// Attach this chain to a trigger data object under [`CHAIN_PAYLOAD_KEY`].
    pub fn attach_to(&self, trigger_data: &mut serde_json::Value) {
        if !trigger_data.is_object() {
            *trigger_data = serde_json::json!({});
        }
        if let Some(map) = trigger_data.as_object_mut() {
            map.insert(CHAIN_PAYLOAD_KEY.to_string(), self.to_payload());
        }
    }

    /// Restore the chain carried inside trigger data, if any.
    pub fn restore_from(trigger_data: &serde_json::Value) -> DomainResult<Self> {
        Self::from_payload(trigger_data.get(CHAIN_PAYLOAD_KEY))
    }
}

/// Result of splitting a chain over sibling rules.
#[derive(Debug, Default)]
pub struct FanOut {
    pub accepted: Vec<(Uuid, AutomationChain)>,
    pub denied: Vec<(Uuid, ChainDenial)>,
}
