//! One (store, resource) synchronization task.

use crate::error::{SyncError, TaskFailure};
use crate::watermark::{self, Watermarks};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fs::File;
use std::path::{Path, PathBuf};
use storemirror_api::{ApiResult, CancelToken, Client, HttpTransport, ListOptions};
use storemirror_changelog::{ChangelogWriter, Record};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument};

/// Page size requested from the API by sync fetches.
pub const FETCH_PAGE_LIMIT: u32 = 250;

/// How many records the fan-in channel buffers ahead of the writer.
const FAN_IN_CAPACITY: usize = 1;

/// Which fetch plan a task chose after inspecting its changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// No usable watermarks: one unbounded stream.
    All,
    /// Two bounded streams, one per side of the existing data.
    ///
    /// Records right at either boundary may duplicate what is already on
    /// disk; compaction collapses them later.
    Both {
        /// Upper bound for the backward stream (`updated_at_max`).
        oldest: DateTime<Utc>,
        /// Lower bound for the forward stream (`updated_at_min`).
        newest: DateTime<Utc>,
    },
}

impl FetchPlan {
    /// Derives the plan from the scanned watermarks.
    pub fn from_watermarks(marks: &Watermarks) -> Self {
        match (marks.oldest, marks.newest) {
            (Some(oldest), Some(newest)) => FetchPlan::Both { oldest, newest },
            _ => FetchPlan::All,
        }
    }
}

/// The lifecycle of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not yet started.
    Pending,
    /// Scanning the existing changelog for watermarks.
    Scanning,
    /// Streams running; the writer is draining records.
    Fetching,
    /// Completed with no recorded errors.
    Done,
    /// Completed with recorded errors.
    Failed,
}

/// Mirrors one resource of one store into its changelog file.
///
/// The task is the sole owner of the output file handle; fetch streams
/// only ever send into a channel the task's writer drains. A write
/// failure cancels the client's token, which stops this task's streams;
/// give each task's client a child of the run-level token so siblings
/// keep running.
pub struct SyncTask<T: HttpTransport> {
    client: Client<T>,
    resource: String,
    output_path: PathBuf,
    dry_run: bool,
    cancel: CancelToken,
    state: RwLock<TaskState>,
}

impl<T: HttpTransport + 'static> SyncTask<T> {
    /// Creates a task writing to `{output_dir}/{store_id}/{resource}.jsonl`.
    pub fn new(
        client: Client<T>,
        resource: impl Into<String>,
        output_dir: &Path,
        dry_run: bool,
    ) -> Self {
        let resource = resource.into();
        let output_path = output_dir
            .join(client.store_id())
            .join(format!("{resource}.jsonl"));
        let cancel = client.cancel_token();
        Self {
            client,
            resource,
            output_path,
            dry_run,
            cancel,
            state: RwLock::new(TaskState::Pending),
        }
    }

    /// The store this task mirrors.
    pub fn store_id(&self) -> &str {
        self.client.store_id()
    }

    /// The resource this task mirrors.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Where this task writes.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// The task's current state.
    pub fn state(&self) -> TaskState {
        *self.state.read()
    }

    fn set_state(&self, state: TaskState) {
        *self.state.write() = state;
    }

    /// Runs the task to completion, returning how many records were
    /// appended.
    pub async fn run(&self) -> Result<u64, TaskFailure> {
        let span = tracing::info_span!(
            "sync",
            store = %self.client.store_id(),
            resource = %self.resource,
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<u64, TaskFailure> {
        self.set_state(TaskState::Scanning);
        info!(
            "scanning {} for oldest and latest updated_at timestamp",
            self.output_path.display()
        );
        let (file, marks) = match watermark::open_and_scan(&self.output_path) {
            Ok(opened) => opened,
            Err(err) => {
                error!("error scanning existing file: {err}");
                self.set_state(TaskState::Failed);
                return Err(self.failure(vec![err]));
            }
        };

        let plan = FetchPlan::from_watermarks(&marks);
        if self.dry_run {
            self.log_dry_run(plan);
            self.set_state(TaskState::Done);
            return Ok(0);
        }

        self.set_state(TaskState::Fetching);
        let (tx, rx) = mpsc::channel(FAN_IN_CAPACITY);
        let mut producers = JoinSet::new();
        match plan {
            FetchPlan::All => {
                info!("no existing data found, fetching all values");
                self.spawn_forward(
                    &mut producers,
                    ListOptions {
                        limit: Some(FETCH_PAGE_LIMIT),
                        ..Default::default()
                    },
                    tx.clone(),
                );
            }
            FetchPlan::Both { oldest, newest } => {
                info!("fetching all values before {}", oldest.to_rfc3339());
                self.spawn_forward(
                    &mut producers,
                    ListOptions {
                        limit: Some(FETCH_PAGE_LIMIT),
                        updated_at_max: Some(oldest),
                        ..Default::default()
                    },
                    tx.clone(),
                );

                info!("fetching all values after {}", newest.to_rfc3339());
                self.spawn_forward(
                    &mut producers,
                    ListOptions {
                        limit: Some(FETCH_PAGE_LIMIT),
                        updated_at_min: Some(newest),
                        ..Default::default()
                    },
                    tx.clone(),
                );
            }
        }
        // The writer's channel closes once every producer is done.
        drop(tx);

        let mut errors = Vec::new();
        let written = self.drain(file, rx, &mut errors).await;
        while producers.join_next().await.is_some() {}

        if errors.is_empty() {
            self.set_state(TaskState::Done);
            info!("finished fetching values with no errors");
            Ok(written)
        } else {
            self.set_state(TaskState::Failed);
            Err(self.failure(errors))
        }
    }

    /// Forwards one pagination stream into the fan-in channel.
    fn spawn_forward(
        &self,
        producers: &mut JoinSet<()>,
        options: ListOptions,
        tx: mpsc::Sender<ApiResult<Record>>,
    ) {
        let mut stream = self.client.paginate(&self.resource, options);
        producers.spawn(async move {
            while let Some(item) = stream.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }

    /// The single writer: owns the file handle and appends each record as
    /// one line. A write failure cancels in-flight streams and aborts
    /// further draining; fetch errors are recorded and draining continues.
    async fn drain(
        &self,
        file: File,
        mut rx: mpsc::Receiver<ApiResult<Record>>,
        errors: &mut Vec<SyncError>,
    ) -> u64 {
        let mut writer = ChangelogWriter::new(file);
        while let Some(item) = rx.recv().await {
            match item {
                Ok(record) => {
                    if let Err(err) = writer.append(&record) {
                        error!("error writing record to file: {err}");
                        errors.push(SyncError::Write(err));
                        self.cancel.cancel();
                        break;
                    }
                }
                Err(err) => {
                    error!("error fetching records: {err}");
                    errors.push(SyncError::Fetch(err));
                }
            }
        }
        debug!("collected {} records", writer.written());
        writer.written()
    }

    fn log_dry_run(&self, plan: FetchPlan) {
        match plan {
            FetchPlan::All => {
                info!(
                    "dry run: would fetch all {} with limit {FETCH_PAGE_LIMIT}",
                    self.resource
                );
            }
            FetchPlan::Both { oldest, newest } => {
                info!(
                    "dry run: would fetch {} updated at or before {} and at or after {}, limit {FETCH_PAGE_LIMIT}",
                    self.resource,
                    oldest.to_rfc3339(),
                    newest.to_rfc3339()
                );
            }
        }
    }

    fn failure(&self, errors: Vec<SyncError>) -> TaskFailure {
        TaskFailure {
            store_id: self.client.store_id().to_owned(),
            resource: self.resource.clone(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::Arc;
    use storemirror_api::{ClientConfig, HttpResponse, MockTransport};

    fn test_client(transport: Arc<MockTransport>, cancel: CancelToken) -> Client<Arc<MockTransport>> {
        let config = ClientConfig::new("acme", "user", "secret")
            .with_retry_attempts(2)
            .with_retry_delay(std::time::Duration::from_millis(1))
            .with_retry_jitter(std::time::Duration::from_millis(1));
        Client::new(config, transport, cancel).unwrap()
    }

    fn count_response(count: u64) -> HttpResponse {
        HttpResponse::new(StatusCode::OK).with_body(format!("{{\"count\":{count}}}"))
    }

    fn page_response(bodies: &[&str], next: Option<&str>) -> HttpResponse {
        let body = format!("{{\"orders\":[{}]}}", bodies.join(","));
        let mut response = HttpResponse::new(StatusCode::OK).with_body(body);
        if let Some(url) = next {
            response = response.with_header("link", &format!("<{url}>; rel=\"next\""));
        }
        response
    }

    #[tokio::test]
    async fn empty_changelog_triggers_one_unbounded_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.push_response(count_response(0));
        transport.push_response(page_response(&[], None));

        let client = test_client(Arc::clone(&transport), CancelToken::new());
        let task = SyncTask::new(client, "orders", dir.path(), false);

        let written = task.run().await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(task.state(), TaskState::Done);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2, "one count plus one page request");
        let query = requests[1].url.query().unwrap();
        assert_eq!(query, "limit=250", "unbounded fetch must carry no time bounds");
    }

    #[tokio::test]
    async fn existing_records_trigger_two_bounded_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme").join("orders.jsonl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "{\"id\":1,\"updated_at\":\"2020-01-05T00:00:00Z\"}\n",
        )
        .unwrap();

        let transport = Arc::new(MockTransport::new());
        // Two streams, each issuing a count and one page; interleaving is
        // arbitrary so every scripted response terminates its stream.
        for _ in 0..2 {
            transport.push_response(count_response(0));
            transport.push_response(page_response(&[], None));
        }

        let client = test_client(Arc::clone(&transport), CancelToken::new());
        let task = SyncTask::new(client, "orders", dir.path(), false);
        task.run().await.unwrap();

        let queries: Vec<String> = transport
            .requests()
            .iter()
            .filter_map(|request| request.url.query().map(str::to_owned))
            .collect();
        let bound = "2020-01-05T00%3A00%3A00%2B00%3A00";
        assert!(
            queries
                .iter()
                .any(|q| q.contains(&format!("updated_at_max={bound}"))),
            "missing backward bound in {queries:?}"
        );
        assert!(
            queries
                .iter()
                .any(|q| q.contains(&format!("updated_at_min={bound}"))),
            "missing forward bound in {queries:?}"
        );
    }

    #[tokio::test]
    async fn three_pages_of_two_records_land_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let cursor = "https://acme.myshopify.com/admin/api/2020-04/orders.json?page_info=abc";
        transport.push_response(count_response(6));
        transport.push_response(page_response(
            &[
                "{\"id\":1,\"updated_at\":\"2020-03-01T00:00:00Z\"}",
                "{\"id\":2,\"updated_at\":\"2020-01-01T00:00:00Z\"}",
            ],
            Some(cursor),
        ));
        transport.push_response(page_response(
            &[
                "{\"id\":3,\"updated_at\":\"2020-02-01T00:00:00Z\"}",
                "{\"id\":4}",
            ],
            Some(cursor),
        ));
        transport.push_response(page_response(
            &["{\"id\":5}", "{\"id\":6}"],
            None,
        ));

        let client = test_client(Arc::clone(&transport), CancelToken::new());
        let task = SyncTask::new(client, "orders", dir.path(), false);

        let written = task.run().await.unwrap();
        assert_eq!(written, 6);

        let contents = std::fs::read_to_string(task.output_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 6);
        // Arrival order, not timestamp order; compaction sorts later.
        for (idx, line) in lines.iter().enumerate() {
            assert!(
                line.contains(&format!("\"id\":{}", idx + 1)),
                "line {idx} out of order: {line}"
            );
        }
    }

    #[tokio::test]
    async fn malformed_changelog_fails_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme").join("orders.jsonl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json\n").unwrap();

        let transport = Arc::new(MockTransport::new());
        let client = test_client(Arc::clone(&transport), CancelToken::new());
        let task = SyncTask::new(client, "orders", dir.path(), false);

        let failure = task.run().await.unwrap_err();
        assert_eq!(task.state(), TaskState::Failed);
        assert!(matches!(failure.errors[0], SyncError::Changelog(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn fetch_errors_are_recorded_but_do_not_stop_draining() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.push_response(count_response(1));
        // Page request: a client error, not retried.
        transport.push_response(
            HttpResponse::new(StatusCode::FORBIDDEN).with_body(r#"{"error":"forbidden"}"#),
        );

        let client = test_client(Arc::clone(&transport), CancelToken::new());
        let task = SyncTask::new(client, "orders", dir.path(), false);

        let failure = task.run().await.unwrap_err();
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(failure.errors.len(), 1);
        assert!(matches!(failure.errors[0], SyncError::Fetch(_)));
    }

    #[tokio::test]
    async fn dry_run_scans_but_never_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let client = test_client(Arc::clone(&transport), CancelToken::new());
        let task = SyncTask::new(client, "orders", dir.path(), true);

        let written = task.run().await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(task.state(), TaskState::Done);
        assert!(task.output_path().exists());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_completes_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let client = test_client(Arc::clone(&transport), cancel);
        let task = SyncTask::new(client, "orders", dir.path(), false);

        let written = task.run().await.unwrap();
        assert_eq!(written, 0);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn fetch_plan_requires_both_bounds() {
        assert_eq!(
            FetchPlan::from_watermarks(&Watermarks::default()),
            FetchPlan::All
        );

        let ts = DateTime::parse_from_rfc3339("2020-01-05T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let marks = Watermarks {
            oldest: Some(ts),
            newest: Some(ts),
        };
        assert_eq!(
            FetchPlan::from_watermarks(&marks),
            FetchPlan::Both {
                oldest: ts,
                newest: ts
            }
        );
    }
}
