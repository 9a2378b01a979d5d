//! In-process Nessus stand-in used when no API credentials are configured.
//!
//! Scans move Queued → Running → Completed purely as a function of the time
//! elapsed since creation, read from an injectable clock. A completed scan
//! draws a random selection of catalogue vulnerabilities once and keeps it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use mockable::Clock;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::backend::{Finding, NessusBackend, ScanReport, ScanResults, ScanType};
use super::catalog::{self, VULNERABILITIES};
use crate::domains::tools::ToolError;

const RUNNING_AFTER_MS: i64 = 2_000;
const COMPLETED_AFTER_MS: i64 = 10_000;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Queued,
    Running,
    Completed,
}

impl ScanState {
    fn after(elapsed: TimeDelta) -> Self {
        let elapsed = elapsed.num_milliseconds();
        if elapsed >= COMPLETED_AFTER_MS {
            Self::Completed
        } else if elapsed >= RUNNING_AFTER_MS {
            Self::Running
        } else {
            Self::Queued
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug)]
struct MockScan {
    id: String,
    target: String,
    scan_type: ScanType,
    created: DateTime<Utc>,
    findings: Option<Vec<Finding>>,
}

impl MockScan {
    fn state(&self, now: DateTime<Utc>) -> ScanState {
        ScanState::after(now - self.created)
    }

    fn summary(&self, now: DateTime<Utc>) -> Value {
        json!({
            "id": self.id,
            "status": self.state(now).as_str(),
            "target": self.target,
            "type": self.scan_type.as_str(),
            "created": rfc3339(self.created),
        })
    }
}

pub struct MockBackend {
    clock: Arc<dyn Clock + Send + Sync>,
    scans: Mutex<HashMap<String, MockScan>>,
}

impl MockBackend {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock,
            scans: Mutex::new(HashMap::new()),
        }
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_scan_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("scan-{}-{}", now.timestamp_millis(), suffix)
}

/// Three to seven distinct catalogue entries.
fn draw_findings() -> Vec<Finding> {
    let mut rng = rand::rng();
    let count = rng.random_range(3..=7);
    VULNERABILITIES
        .choose_multiple(&mut rng, count)
        .map(Finding::from)
        .collect()
}

#[async_trait]
impl NessusBackend for MockBackend {
    async fn templates(&self) -> Result<Value, ToolError> {
        Ok(catalog::templates())
    }

    async fn start_scan(&self, target: &str, scan_type: ScanType) -> Result<Value, ToolError> {
        let now = self.clock.utc();
        let id = new_scan_id(now);
        self.scans.lock().await.insert(
            id.clone(),
            MockScan {
                id: id.clone(),
                target: target.to_string(),
                scan_type,
                created: now,
                findings: None,
            },
        );
        Ok(json!({
            "scan_id": id,
            "status": ScanState::Queued.as_str(),
            "message": "Scan queued successfully",
        }))
    }

    async fn scan_status(&self, scan_id: &str) -> Result<Value, ToolError> {
        let now = self.clock.utc();
        let scans = self.scans.lock().await;
        scans
            .get(scan_id)
            .map(|scan| scan.summary(now))
            .ok_or_else(|| ToolError::not_found(format!("Scan not found: {scan_id}")))
    }

    async fn scan_results(&self, scan_id: &str) -> Result<ScanResults, ToolError> {
        let now = self.clock.utc();
        let mut scans = self.scans.lock().await;
        let scan = scans
            .get_mut(scan_id)
            .ok_or_else(|| ToolError::not_found(format!("Scan not found: {scan_id}")))?;

        let state = scan.state(now);
        if state != ScanState::Completed {
            return Ok(ScanResults::Pending {
                status: state.as_str().to_string(),
            });
        }

        let findings = scan.findings.get_or_insert_with(draw_findings).clone();
        Ok(ScanResults::Completed(ScanReport {
            scan_id: scan.id.clone(),
            scan_type: scan.scan_type.as_str().to_string(),
            target: scan.target.clone(),
            start_time: rfc3339(scan.created),
            end_time: rfc3339(scan.created + TimeDelta::milliseconds(COMPLETED_AFTER_MS)),
            status: state.as_str().to_string(),
            vulnerabilities: findings,
        }))
    }

    async fn list_scans(&self) -> Result<Value, ToolError> {
        let now = self.clock.utc();
        let scans = self.scans.lock().await;
        let mut listed: Vec<&MockScan> = scans.values().collect();
        listed.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        let scans: Vec<Value> = listed.iter().map(|scan| scan.summary(now)).collect();
        Ok(json!({ "scans": scans }))
    }

    fn mode(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
    use mockable::Clock;
    use std::sync::Mutex;

    /// A clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            }
        }

        pub fn advance(&self, by: TimeDelta) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn local(&self) -> DateTime<Local> {
            self.utc().with_timezone(&Local)
        }

        fn utc(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn backend() -> (Arc<ManualClock>, MockBackend) {
        let clock = Arc::new(ManualClock::new());
        (clock.clone(), MockBackend::new(clock))
    }

    #[test]
    fn test_state_thresholds() {
        assert_eq!(ScanState::after(TimeDelta::milliseconds(1999)), ScanState::Queued);
        assert_eq!(ScanState::after(TimeDelta::seconds(2)), ScanState::Running);
        assert_eq!(ScanState::after(TimeDelta::milliseconds(9999)), ScanState::Running);
        assert_eq!(ScanState::after(TimeDelta::seconds(10)), ScanState::Completed);
    }

    #[test]
    fn test_scan_id_shape() {
        let now = Utc.timestamp_millis_opt(1_714_564_800_123).unwrap();
        let id = new_scan_id(now);
        let suffix = id.strip_prefix("scan-1714564800123-").unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(suffix.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_lifecycle_follows_the_clock() {
        let (clock, backend) = backend();
        let started = backend
            .start_scan("192.168.1.10", ScanType::BasicNetworkScan)
            .await
            .unwrap();
        assert_eq!(started["status"], "queued");
        let id = started["scan_id"].as_str().unwrap().to_string();

        let status = backend.scan_status(&id).await.unwrap();
        assert_eq!(status["status"], "queued");
        assert_eq!(status["type"], "basic-network-scan");
        assert!(matches!(
            backend.scan_results(&id).await.unwrap(),
            ScanResults::Pending { status } if status == "queued"
        ));

        clock.advance(TimeDelta::seconds(3));
        assert_eq!(backend.scan_status(&id).await.unwrap()["status"], "running");

        clock.advance(TimeDelta::seconds(7));
        assert_eq!(backend.scan_status(&id).await.unwrap()["status"], "completed");
        let ScanResults::Completed(first) = backend.scan_results(&id).await.unwrap() else {
            panic!("expected a completed report");
        };
        assert!((3..=7).contains(&first.vulnerabilities.len()));
        assert_eq!(first.target, "192.168.1.10");

        let ScanResults::Completed(second) = backend.scan_results(&id).await.unwrap() else {
            panic!("expected a completed report");
        };
        assert_eq!(first.vulnerabilities, second.vulnerabilities);
    }

    #[tokio::test]
    async fn test_unknown_scan_is_not_found() {
        let (_, backend) = backend();
        let err = backend.scan_status("scan-0-missing").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(msg) if msg == "Scan not found: scan-0-missing"));
        assert!(backend.scan_results("scan-0-missing").await.is_err());
    }

    #[tokio::test]
    async fn test_list_scans_in_creation_order() {
        let (clock, backend) = backend();
        backend.start_scan("10.0.0.1", ScanType::BasicNetworkScan).await.unwrap();
        clock.advance(TimeDelta::seconds(5));
        backend.start_scan("shop.example.com", ScanType::WebAppScan).await.unwrap();

        let listed = backend.list_scans().await.unwrap();
        let scans = listed["scans"].as_array().unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0]["target"], "10.0.0.1");
        assert_eq!(scans[0]["status"], "running");
        assert_eq!(scans[1]["target"], "shop.example.com");
        assert_eq!(scans[1]["status"], "queued");
    }
}
