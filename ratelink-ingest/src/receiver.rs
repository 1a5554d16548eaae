//! Push interface between pipeline stages

use ratelink_common::data::{ApplicationData, HeadingData};

/// A stage that accepts scraped records
///
/// Loaders call these from many tasks at once, so implementations must be
/// safe for concurrent producers and must not block for long.
pub trait DataReceiver: Send + Sync {
    fn put_heading_data(&self, heading: HeadingData);

    fn put_application_data(&self, application: ApplicationData);
}
