//! Buffered Receiver
//!
//! Sits between a university loader and the rest of the pipeline. The
//! loader pushes rows carrying noisy local identifiers; nothing is
//! forwarded until `finalize` has resolved every distinct internal ID to a
//! canonical one, so downstream never sees a raw local ID.

use ratelink_common::data::{ApplicationData, HeadingData};
use ratelink_common::{
    extract_internal_id, AppDetails, IdResolver, ResolveRequestItem, ResolveResponseItem,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const PROGRESS_LOG_EVERY: usize = 100;

#[derive(Default)]
struct Buffer {
    headings: BTreeMap<String, HeadingData>,
    /// Applications grouped by internal ID; BTreeMap keeps requests sorted
    applications: BTreeMap<String, Vec<ApplicationData>>,
    received: usize,
}

/// Outcome of one `finalize` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalizeSummary {
    pub students: usize,
    pub applications: usize,
    pub high_confidence: usize,
    pub good_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub fallbacks: usize,
    /// True when the resolver call failed and every entry fell back
    pub resolver_failed: bool,
}

impl FinalizeSummary {
    fn count(&mut self, confidence: f64) {
        if confidence >= 0.8 {
            self.high_confidence += 1;
        } else if confidence >= 0.6 {
            self.good_confidence += 1;
        } else if confidence >= 0.4 {
            self.medium_confidence += 1;
        } else if confidence > 0.0 {
            self.low_confidence += 1;
        } else {
            self.fallbacks += 1;
        }
    }
}

/// Holds applications until their identifiers are resolved
pub struct BufferedReceiver {
    downstream: Arc<dyn crate::DataReceiver>,
    resolver: Arc<dyn IdResolver>,
    buffer: Mutex<Buffer>,
}

impl BufferedReceiver {
    pub fn new(downstream: Arc<dyn crate::DataReceiver>, resolver: Arc<dyn IdResolver>) -> Self {
        Self {
            downstream,
            resolver,
            buffer: Mutex::new(Buffer::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // A panicking producer must not wedge the whole university
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Heading seen so far under `code`
    pub fn heading(&self, code: &str) -> Option<HeadingData> {
        self.lock().headings.get(code).cloned()
    }

    /// Number of distinct internal IDs currently buffered
    pub fn buffered_students(&self) -> usize {
        self.lock().applications.len()
    }

    /// Resolve all buffered identifiers and forward every application
    ///
    /// The buffer is drained, so a second call forwards only what arrived
    /// after the first one.
    pub async fn finalize(&self) -> FinalizeSummary {
        let (applications, received) = {
            let mut buffer = self.lock();
            let received = buffer.received;
            buffer.received = 0;
            (std::mem::take(&mut buffer.applications), received)
        };

        info!(
            students = applications.len(),
            applications = received,
            "Finalizing buffered receiver"
        );

        let requests = build_requests(&applications);
        let mut summary = FinalizeSummary {
            students: applications.len(),
            ..Default::default()
        };

        let resolved: HashMap<String, ResolveResponseItem> = if requests.is_empty() {
            HashMap::new()
        } else {
            match self.resolver.resolve_batch(requests).await {
                Ok(items) => items
                    .into_iter()
                    .map(|item| (item.internal_id.clone(), item))
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "ID resolution failed, using fallback identities for all students");
                    summary.resolver_failed = true;
                    HashMap::new()
                }
            }
        };

        for (internal_id, apps) in applications {
            let resolution = match resolved.get(&internal_id) {
                Some(item) => item.clone(),
                None => {
                    if !summary.resolver_failed {
                        warn!(internal_id = %internal_id, "No resolution returned, using fallback identity");
                    }
                    ResolveResponseItem::fallback(&internal_id)
                }
            };

            debug!(
                internal_id = %internal_id,
                canonical_id = %resolution.canonical_id,
                confidence = resolution.confidence,
                "ID resolved"
            );
            summary.count(resolution.confidence);

            for mut app in apps {
                app.student_id = resolution.canonical_id.clone();
                self.downstream.put_application_data(app);
                summary.applications += 1;
            }
        }

        info!(
            high_confidence = summary.high_confidence,
            good_confidence = summary.good_confidence,
            medium_confidence = summary.medium_confidence,
            low_confidence = summary.low_confidence,
            fallback_ids = summary.fallbacks,
            "ID resolution statistics"
        );
        info!(
            students = summary.students,
            applications = summary.applications,
            "Buffered receiver finalization complete"
        );

        summary
    }
}

impl crate::DataReceiver for BufferedReceiver {
    fn put_heading_data(&self, heading: HeadingData) {
        self.lock().headings.insert(heading.code.clone(), heading.clone());
        self.downstream.put_heading_data(heading);
    }

    fn put_application_data(&self, application: ApplicationData) {
        let internal_id = extract_internal_id(&application.student_id, application.competition_type);

        let (received, students) = {
            let mut buffer = self.lock();
            buffer
                .applications
                .entry(internal_id)
                .or_default()
                .push(application);
            buffer.received += 1;
            (buffer.received, buffer.applications.len())
        };

        if received % PROGRESS_LOG_EVERY == 0 {
            info!(
                total_received = received,
                unique_students = students,
                "Buffered receiver progress"
            );
        }
    }
}

fn build_requests(applications: &BTreeMap<String, Vec<ApplicationData>>) -> Vec<ResolveRequestItem> {
    applications
        .iter()
        .map(|(internal_id, apps)| ResolveRequestItem {
            internal_id: internal_id.clone(),
            apps: apps
                .iter()
                .map(|app| AppDetails {
                    pretty_name: app.heading_name.clone(),
                    score_sum: app.scores_sum,
                    rating_place: app.rating_place,
                    priority: app.priority,
                    dvi_score: app.dvi_score,
                    ege_scores: app.ege_scores.clone(),
                    achievements_score: 0,
                    competition_type: Some(app.competition_type),
                })
                .collect(),
        })
        .collect()
}
