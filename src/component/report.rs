//! The value a `StatusReport` function produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::argmapper::Typed;

/// Health of a component or one of its resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Unknown,
    Alive,
    Ready,
    Down,
    Partial,
}

/// Health of one resource the component manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub name: String,
    pub health: Health,
    #[serde(default)]
    pub message: String,
}

/// A point-in-time status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub health: Health,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub resources: Vec<ResourceReport>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// An empty report stamped with the current time.
    pub fn new(health: Health, message: impl Into<String>) -> Self {
        Self {
            health,
            message: message.into(),
            resources: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Build a report whose overall health is derived from `resources`.
    ///
    /// All ready gives `Ready`, all down gives `Down`, a mix with at least
    /// one ready or alive resource gives `Partial`. No resources at all is
    /// `Unknown`.
    pub fn from_resources(resources: Vec<ResourceReport>) -> Self {
        let health = aggregate(&resources);
        let message = match health {
            Health::Ready => "all resources are ready".to_string(),
            Health::Down => "all resources are down".to_string(),
            Health::Unknown if resources.is_empty() => "no resources reported".to_string(),
            _ => {
                let down = resources.iter().filter(|r| r.health == Health::Down).count();
                format!("{} of {} resources are down", down, resources.len())
            }
        };
        Self {
            resources,
            ..Self::new(health, message)
        }
    }

    /// Builder: add a resource without recomputing overall health.
    pub fn with_resource(mut self, name: impl Into<String>, health: Health) -> Self {
        self.resources.push(ResourceReport {
            name: name.into(),
            health,
            message: String::new(),
        });
        self
    }
}

fn aggregate(resources: &[ResourceReport]) -> Health {
    if resources.is_empty() {
        return Health::Unknown;
    }
    if resources.iter().all(|r| r.health == Health::Ready) {
        return Health::Ready;
    }
    if resources.iter().all(|r| r.health == Health::Down) {
        return Health::Down;
    }
    let up = resources
        .iter()
        .any(|r| matches!(r.health, Health::Ready | Health::Alive));
    let down = resources
        .iter()
        .any(|r| matches!(r.health, Health::Down | Health::Partial));
    match (up, down) {
        (true, true) => Health::Partial,
        (true, false) => Health::Alive,
        _ => Health::Unknown,
    }
}

impl Typed for Report {
    const TYPE: &'static str = "component.StatusReport";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str, health: Health) -> ResourceReport {
        ResourceReport {
            name: name.into(),
            health,
            message: String::new(),
        }
    }

    #[test]
    fn test_overall_health() {
        let ready = Report::from_resources(vec![resource("a", Health::Ready)]);
        assert_eq!(ready.health, Health::Ready);

        let mixed = Report::from_resources(vec![
            resource("a", Health::Ready),
            resource("b", Health::Down),
        ]);
        assert_eq!(mixed.health, Health::Partial);
        assert_eq!(mixed.message, "1 of 2 resources are down");

        let down = Report::from_resources(vec![resource("a", Health::Down)]);
        assert_eq!(down.health, Health::Down);

        assert_eq!(Report::from_resources(Vec::new()).health, Health::Unknown);
    }

    #[test]
    fn test_wire_shape() {
        let report = Report::new(Health::Alive, "ok").with_resource("db", Health::Ready);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["health"], "alive");
        assert_eq!(json["resources"][0]["health"], "ready");
        assert!(json["generated_at"].is_string());
    }
}
