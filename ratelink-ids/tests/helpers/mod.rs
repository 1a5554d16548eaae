//! Shared fixtures for ratelink-ids integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ratelink_common::{AppDetails, Competition, ResolveRequestItem};
use ratelink_ids::config::{ProgramConfig, ServiceConfig};
use ratelink_ids::db;
use ratelink_ids::db::fetch_runs::FetchRunStatus;
use ratelink_ids::registry::{FetchError, RegistryApplicant, RegistryResponse, RosterSource};
use ratelink_ids::services::{build_services, ResolutionService};
use ratelink_ids::utils::Sleeper;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Roster source answering from a fixed table
#[derive(Default)]
pub struct StaticSource {
    responses: HashMap<String, Result<RegistryResponse, FetchError>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticSource {
    pub fn with_roster(mut self, list_id: &str, applicants: Vec<RegistryApplicant>) -> Self {
        self.responses.insert(
            list_id.to_string(),
            Ok(RegistryResponse {
                update_date: Some("2025-07-28T10:00:00".to_string()),
                applicants,
            }),
        );
        self
    }

    pub fn with_error(mut self, list_id: &str, error: FetchError) -> Self {
        self.responses.insert(list_id.to_string(), Err(error));
        self
    }

    pub fn calls(&self, list_id: &str) -> usize {
        self.calls.lock().unwrap().get(list_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RosterSource for StaticSource {
    async fn fetch_roster(&self, list_id: &str) -> Result<RegistryResponse, FetchError> {
        *self.calls.lock().unwrap().entry(list_id.to_string()).or_default() += 1;
        self.responses
            .get(list_id)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}

/// Sleeper that returns immediately and remembers what it was asked
#[derive(Default)]
pub struct InstantSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn registry_row(id: i64, rating: i32, priority: i32, exams: &[f64], without_tests: bool) -> RegistryApplicant {
    let mut results = exams.iter().copied().map(Some);
    RegistryApplicant {
        rating,
        priority,
        sum_mark: Some(exams.iter().sum()),
        without_tests,
        result1: results.next().flatten(),
        result2: results.next().flatten(),
        result3: results.next().flatten(),
        result4: results.next().flatten(),
        status_id: 1,
        id_application: id,
        ..Default::default()
    }
}

pub fn app(program: &str, place: i32, priority: i32, exams: &[i32], competition: Competition) -> AppDetails {
    AppDetails {
        pretty_name: program.to_string(),
        score_sum: exams.iter().sum(),
        rating_place: place,
        priority,
        ege_scores: exams.to_vec(),
        competition_type: Some(competition),
        ..Default::default()
    }
}

pub fn item(internal_id: &str, apps: Vec<AppDetails>) -> ResolveRequestItem {
    ResolveRequestItem {
        internal_id: internal_id.to_string(),
        apps,
    }
}

/// Two programs: Math publishes regular/BVI and dedicated lists, Physics
/// only the regular one
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        programs: vec![
            ProgramConfig {
                name: "Math".to_string(),
                regular_bvi: "101".to_string(),
                special_quota: String::new(),
                target_quota: String::new(),
                dedicated_quota: "104".to_string(),
            },
            ProgramConfig {
                name: "Physics".to_string(),
                regular_bvi: "201".to_string(),
                special_quota: String::new(),
                target_quota: String::new(),
                dedicated_quota: String::new(),
            },
        ],
        ..ServiceConfig::default()
    }
}

/// Registry content matching [`test_config`]
pub fn populated_source() -> StaticSource {
    StaticSource::default()
        .with_roster(
            "101",
            vec![
                registry_row(9001, 1, 1, &[], true),
                registry_row(9002, 2, 1, &[], true),
                registry_row(1001, 3, 1, &[90.0, 80.0, 70.0], false),
                registry_row(1002, 4, 2, &[60.0, 60.0, 60.0], false),
            ],
        )
        .with_roster("104", vec![registry_row(1001, 1, 1, &[90.0, 80.0, 70.0], false)])
        .with_roster("201", vec![registry_row(2001, 1, 1, &[75.0], false)])
}

/// Source where every list fails
pub fn failing_source() -> StaticSource {
    StaticSource::default()
        .with_error("101", FetchError::Status(500))
        .with_error("104", FetchError::Status(500))
        .with_error("201", FetchError::Network("connection refused".to_string()))
}

pub struct TestService {
    pub service: Arc<ResolutionService>,
    pub source: Arc<StaticSource>,
    pub sleeper: Arc<InstantSleeper>,
    pub pool: SqlitePool,
}

pub async fn test_service(source: StaticSource) -> TestService {
    let pool = db::init_memory_pool().await.unwrap();
    let source = Arc::new(source);
    let sleeper = Arc::new(InstantSleeper::default());

    let service = build_services(&test_config(), pool.clone(), source.clone(), sleeper.clone())
        .await
        .unwrap();

    TestService {
        service,
        source,
        sleeper,
        pool,
    }
}

/// Poll until a fetch run has been recorded and finished
pub async fn wait_for_finished_run(service: &ResolutionService) {
    for _ in 0..500 {
        let status = service.fetch_status().await.unwrap();
        let finished = status
            .latest_run
            .is_some_and(|run| run.status != FetchRunStatus::InProgress);
        if finished && !status.in_progress {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("fetch cycle did not finish");
}
