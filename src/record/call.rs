use std::collections::HashMap;

use super::unix_millis;

/// Capability surface of one measured call, as consumed by the engine.
///
/// The engine ships records through channels and reads only this surface, so
/// downstream codebases can wrap or replace [`CallRecord`] with their own
/// variants (decorators over a base record are common). A record with
/// sub-results is a container: the engine reports each sub-result once and
/// never the parent, flattening exactly one level.
pub trait CallOutcome: Send {
    fn name(&self) -> &str;
    fn url(&self) -> &str;
    fn method(&self) -> &str;
    fn request_header(&self) -> &HashMap<String, String>;
    fn request_body(&self) -> &str;
    fn sent_bytes(&self) -> usize;
    fn response_code(&self) -> i32;
    fn response_header(&self) -> &HashMap<String, String>;
    fn response_body(&self) -> &str;
    fn received_bytes(&self) -> usize;
    fn failure_message(&self) -> &str;
    fn is_success(&self) -> bool;
    fn begin_time_ms(&self) -> i64;
    fn end_time_ms(&self) -> i64;
    fn has_sub_results(&self) -> bool;
    fn take_sub_results(&mut self) -> Vec<Box<dyn CallOutcome>>;
}

/// Mutable measurement record populated by a request plugin.
///
/// Not thread-safe; a record is owned by the executor that acquired it until
/// it is handed to the aggregator.
#[derive(Debug, Default)]
pub struct CallRecord {
    pub name: String,
    pub url: String,
    pub method: String,
    pub request_header: HashMap<String, String>,
    pub request_body: String,
    pub sent_bytes: usize,
    pub response_code: i32,
    pub response_header: HashMap<String, String>,
    pub response_body: String,
    pub received_bytes: usize,
    pub failure_message: String,
    pub success: bool,
    pub begin_time_ms: i64,
    pub end_time_ms: i64,
    pub sub_results: Vec<CallRecord>,
    sub_index: usize,
}

impl CallRecord {
    /// Creates a fresh record with both timestamps stamped to now and
    /// `success` preset to true.
    #[must_use]
    pub fn acquire(name: &str) -> Self {
        let now = unix_millis();
        Self {
            name: name.to_owned(),
            success: true,
            begin_time_ms: now,
            end_time_ms: now,
            ..Self::default()
        }
    }

    /// Stamps the begin time. Call before the measured window opens.
    pub fn begin(&mut self) {
        self.begin_time_ms = unix_millis();
    }

    /// Stamps the end time and derives `success` from the response code.
    ///
    /// A plugin that wants a different success criterion overrides the flag
    /// after this call.
    pub fn end(&mut self) {
        self.success = self.response_code == 200;
        self.end_time_ms = unix_millis();
    }

    /// Appends a child record and returns it for population.
    ///
    /// An empty `name` auto-names the child `"<parent>-<n>"` with a running
    /// counter; otherwise `use_name_prefix` selects `"<parent>-<name>"` over
    /// the bare name.
    pub fn add_sub(&mut self, name: &str, use_name_prefix: bool) -> &mut CallRecord {
        let sub_name = if name.is_empty() {
            let numbered = format!("{}-{}", self.name, self.sub_index);
            self.sub_index = self.sub_index.saturating_add(1);
            numbered
        } else if use_name_prefix {
            format!("{}-{}", self.name, name)
        } else {
            name.to_owned()
        };
        self.sub_results.push(CallRecord::acquire(&sub_name));
        // push above guarantees non-empty
        let last = self.sub_results.len() - 1;
        &mut self.sub_results[last]
    }
}

impl CallOutcome for CallRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn request_header(&self) -> &HashMap<String, String> {
        &self.request_header
    }

    fn request_body(&self) -> &str {
        &self.request_body
    }

    fn sent_bytes(&self) -> usize {
        self.sent_bytes
    }

    fn response_code(&self) -> i32 {
        self.response_code
    }

    fn response_header(&self) -> &HashMap<String, String> {
        &self.response_header
    }

    fn response_body(&self) -> &str {
        &self.response_body
    }

    fn received_bytes(&self) -> usize {
        self.received_bytes
    }

    fn failure_message(&self) -> &str {
        &self.failure_message
    }

    fn is_success(&self) -> bool {
        self.success
    }

    fn begin_time_ms(&self) -> i64 {
        self.begin_time_ms
    }

    fn end_time_ms(&self) -> i64 {
        self.end_time_ms
    }

    fn has_sub_results(&self) -> bool {
        !self.sub_results.is_empty()
    }

    fn take_sub_results(&mut self) -> Vec<Box<dyn CallOutcome>> {
        std::mem::take(&mut self.sub_results)
            .into_iter()
            .map(|sub| Box::new(sub) as Box<dyn CallOutcome>)
            .collect()
    }
}
