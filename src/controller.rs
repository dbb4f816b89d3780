use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn, error};

use crate::{
    config::WizardConfig,
    models::{Category, DesignFile, GenerateMockupsRequest, UploadedDesign},
    preview::{create_transparent_preview, PreviewError},
    screen::{render, Screen},
    services::{MockupBackend, ServiceError},
    wizard::{Ticket, WizardError, WizardState},
};

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("{file}: {source}")]
    Preview { file: String, source: PreviewError },
    #[error("{file}: {source}")]
    Upload { file: String, source: ServiceError },
    #[error("upload task failed: {0}")]
    Task(String),
}

/// Drives one wizard session: applies transitions to the shared state and performs the
/// service calls in between. The state lock is never held across an `.await`.
#[derive(Clone)]
pub struct WizardController {
    state: Arc<RwLock<WizardState>>,
    backend: Arc<dyn MockupBackend>,
    config: Arc<WizardConfig>,
}

impl WizardController {
    pub fn new(backend: Arc<dyn MockupBackend>, config: Arc<WizardConfig>) -> Self {
        Self { state: Arc::default(), backend, config }
    }

    pub fn snapshot(&self) -> WizardState { self.state.read().clone() }

    pub fn screen(&self) -> Screen { render(&self.state.read(), &self.config) }

    /// Applies the category change immediately; the returned ticket feeds [`Self::load_thumbnails`].
    pub fn begin_category(&self, category: Category) -> Ticket {
        if !category.is_known() {
            warn!("⚠️ Unrecognised category '{}' forwarded to the thumbnail service", category);
        }
        self.state.write().select_category(category)
    }

    pub async fn load_thumbnails(&self, category: Category, ticket: Ticket) {
        let result = self.backend.fetch_thumbnails(&category).await;
        if let Err(e) = &result {
            error!("❌ Thumbnail fetch for '{}' failed: {}", category, e);
        }
        if !self.state.write().thumbnails_loaded(ticket, result) {
            info!("⏭️ Dropping stale thumbnails for '{}'", category);
        }
    }

    pub async fn select_category(&self, category: Category) {
        let ticket = self.begin_category(category.clone());
        self.load_thumbnails(category, ticket).await;
    }

    pub fn toggle_thumbnail(&self, thumbnail: &str) -> bool {
        self.state.write().toggle_thumbnail(thumbnail)
    }

    /// Previews and uploads the whole batch. A failing file fails the batch; that outcome is
    /// recorded in the session state, only refusals to start are returned as errors.
    ///
    /// Dropping the returned future mid-batch (a client hanging up on the upload request) aborts
    /// the remaining files and settles the batch as cancelled, so the session never stays busy.
    pub async fn upload_files(&self, files: Vec<DesignFile>) -> Result<(), WizardError> {
        let ticket = self.state.write().begin_upload(files.len())?;
        let guard = UploadGuard { state: &self.state, ticket: Some(ticket) };
        info!("📤 Processing {} designs", files.len());

        let result = process_batch(self.backend.clone(), files).await;
        match &result {
            Ok(designs) => info!("✅ Uploaded {} designs", designs.len()),
            Err(e) => error!("❌ Design batch failed: {}", e),
        }
        if !guard.finish(result) {
            info!("⏭️ Dropping superseded upload batch");
        }
        Ok(())
    }

    /// Checks the guard and reserves the generation slot; the request goes to [`Self::run_generation`].
    pub fn begin_generation(&self) -> Result<(Ticket, GenerateMockupsRequest), WizardError> {
        self.state.write().begin_generation()
    }

    pub async fn run_generation(&self, ticket: Ticket, request: GenerateMockupsRequest) {
        let result = self.backend.generate_mockups(&request).await;
        if let Err(e) = &result {
            error!("❌ Mockup generation failed: {}", e);
        }
        if !self.state.write().generation_finished(ticket, result) {
            info!("⏭️ Dropping mockups generated for a previous category");
        }
    }

    pub async fn generate(&self) -> Result<(), WizardError> {
        let (ticket, request) = self.begin_generation()?;
        self.run_generation(ticket, request).await;
        Ok(())
    }
}

/// Settles an upload ticket exactly once, as cancelled if the batch never got to report.
struct UploadGuard<'a> {
    state: &'a RwLock<WizardState>,
    ticket: Option<Ticket>,
}

impl UploadGuard<'_> {
    fn finish(mut self, result: Result<Vec<UploadedDesign>, DesignError>) -> bool {
        match self.ticket.take() {
            Some(ticket) => self.state.write().upload_finished(ticket, result),
            None => false,
        }
    }
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            if self.state.write().upload_finished(ticket, Err("upload was cancelled")) {
                warn!("⚠️ Upload batch cancelled before it finished");
            }
        }
    }
}

/// Runs every file concurrently and fails fast: the first error drops the set, which aborts the
/// remaining tasks. Output order follows input order.
async fn process_batch(backend: Arc<dyn MockupBackend>, files: Vec<DesignFile>) -> Result<Vec<UploadedDesign>, DesignError> {
    let mut slots: Vec<Option<UploadedDesign>> = vec![None; files.len()];
    let mut tasks = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        let backend = backend.clone();
        tasks.spawn(async move { (index, process_design(backend.as_ref(), file).await) });
    }

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| DesignError::Task(e.to_string()))?;
        slots[index] = Some(result?);
    }
    Ok(slots.into_iter().flatten().collect())
}

async fn process_design(backend: &dyn MockupBackend, file: DesignFile) -> Result<UploadedDesign, DesignError> {
    let preview_bytes = file.bytes.clone();
    let preview = async {
        tokio::task::spawn_blocking(move || create_transparent_preview(&preview_bytes))
            .await
            .map_err(|e| DesignError::Task(e.to_string()))?
            .map_err(|source| DesignError::Preview { file: file.name.clone(), source })
    };
    let upload = async {
        let target = backend
            .request_upload_url(&file.name)
            .await
            .map_err(|source| DesignError::Upload { file: file.name.clone(), source })?;
        backend
            .put_object(&target.upload_url, file.bytes.clone())
            .await
            .map_err(|source| DesignError::Upload { file: file.name.clone(), source })?;
        Ok::<_, DesignError>(target.storage_key)
    };

    let (preview_data_uri, storage_key) = tokio::try_join!(preview, upload)?;
    Ok(UploadedDesign { file_name: file.name, storage_key, preview_data_uri })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{GeneratedMockup, MockupId, UploadTarget, WizardStep},
        preview::sample_png,
        screen::MainView,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    /// In-memory backend. Fetches for `slow` wait for `release`, PUTs of `hang*` never return and
    /// generating from `b.png` fails.
    #[derive(Default)]
    struct FakeBackend {
        stored: Mutex<HashMap<String, Vec<u8>>>,
        generated: Mutex<Vec<GenerateMockupsRequest>>,
        release: Notify,
    }

    #[async_trait]
    impl MockupBackend for FakeBackend {
        async fn fetch_thumbnails(&self, category: &Category) -> Result<Vec<String>, ServiceError> {
            match category.as_str() {
                "mugs" => Ok(vec!["a.png".into(), "b.png".into()]),
                "slow" => {
                    self.release.notified().await;
                    Ok(vec!["late.png".into()])
                }
                _ => Err(ServiceError::Reported("unknown category".into())),
            }
        }

        async fn request_upload_url(&self, file_name: &str) -> Result<UploadTarget, ServiceError> {
            if file_name.starts_with("nourl") {
                return Err(ServiceError::Status(500));
            }
            Ok(UploadTarget { upload_url: format!("mem://{file_name}"), storage_key: format!("designs/{file_name}") })
        }

        async fn put_object(&self, upload_url: &str, bytes: Bytes) -> Result<(), ServiceError> {
            if upload_url.contains("reject") {
                return Err(ServiceError::Status(403));
            }
            if upload_url.contains("hang") {
                std::future::pending::<()>().await;
            }
            self.stored.lock().insert(upload_url.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn generate_mockups(&self, request: &GenerateMockupsRequest) -> Result<Vec<GeneratedMockup>, ServiceError> {
            self.generated.lock().push(request.clone());
            if request.templates.iter().any(|t| t == "b.png") {
                return Err(ServiceError::Status(502));
            }
            Ok(vec![GeneratedMockup {
                id: MockupId::Number(1),
                template_name: request.templates[0].clone(),
                design_name: request.designs[0].clone(),
                mockup_key: "k1.png".into(),
            }])
        }
    }

    fn controller() -> (WizardController, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        (WizardController::new(backend.clone(), Arc::new(WizardConfig::default())), backend)
    }

    fn png(name: &str) -> DesignFile { DesignFile::new(name, sample_png(3, 2)) }

    #[tokio::test]
    async fn category_selection_loads_thumbnails() {
        let (ctl, _) = controller();
        ctl.select_category(Category::Mugs).await;
        let state = ctl.snapshot();
        assert_eq!(state.step(), WizardStep::Upload);
        assert_eq!(state.thumbnails(), ["a.png", "b.png"]);
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn step_changes_before_fetch_resolves() {
        let (ctl, backend) = controller();
        let ticket = ctl.begin_category(Category::from("slow"));
        let pending = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.load_thumbnails(Category::from("slow"), ticket).await }
        });

        tokio::task::yield_now().await;
        let state = ctl.snapshot();
        assert_eq!(state.step(), WizardStep::Upload);
        assert!(state.is_busy());
        assert!(matches!(ctl.screen().main, MainView::Loading { .. }));

        backend.release.notify_one();
        pending.await.unwrap();
        assert_eq!(ctl.snapshot().thumbnails(), ["late.png"]);
    }

    #[tokio::test]
    async fn slow_fetch_for_previous_category_is_discarded() {
        let (ctl, backend) = controller();
        let ticket = ctl.begin_category(Category::from("slow"));
        let stale = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.load_thumbnails(Category::from("slow"), ticket).await }
        });
        tokio::task::yield_now().await;

        ctl.select_category(Category::Mugs).await;
        backend.release.notify_one();
        stale.await.unwrap();

        assert_eq!(ctl.snapshot().thumbnails(), ["a.png", "b.png"]);
        assert!(!ctl.snapshot().is_busy());
    }

    #[tokio::test]
    async fn service_error_is_surfaced() {
        let (ctl, _) = controller();
        ctl.select_category(Category::from("spaceships")).await;
        let state = ctl.snapshot();
        assert_eq!(state.error(), Some("Failed to fetch thumbnails: unknown category"));
        assert!(state.thumbnails().is_empty());
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn batch_upload_preserves_order_and_uploads_bytes() {
        let (ctl, backend) = controller();
        ctl.select_category(Category::Mugs).await;
        let names = ["one.png", "two.png", "three.png", "four.png"];
        ctl.upload_files(names.iter().map(|n| png(n)).collect()).await.unwrap();

        let state = ctl.snapshot();
        assert_eq!(state.step(), WizardStep::ThumbnailSelect);
        let uploaded: Vec<_> = state.designs().iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(uploaded, names);
        assert_eq!(state.designs()[0].storage_key, "designs/one.png");
        assert!(state.designs()[0].preview_data_uri.starts_with("data:image/png;base64,"));
        assert_eq!(backend.stored.lock().len(), 4);
    }

    #[tokio::test]
    async fn one_bad_file_fails_the_batch() {
        let (ctl, _) = controller();
        ctl.select_category(Category::Mugs).await;
        ctl.upload_files(vec![png("good.png"), png("reject.png")]).await.unwrap();

        let state = ctl.snapshot();
        assert_eq!(state.step(), WizardStep::Upload);
        assert!(state.designs().is_empty());
        assert_eq!(state.error(), Some("Failed to process designs: reject.png: HTTP error! status: 403"));
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn undecodable_file_fails_the_batch() {
        let (ctl, _) = controller();
        ctl.select_category(Category::Mugs).await;
        ctl.upload_files(vec![DesignFile::new("notes.txt", &b"hello"[..])]).await.unwrap();
        let error = ctl.snapshot().error().map(str::to_string).unwrap_or_default();
        assert!(error.starts_with("Failed to process designs: notes.txt: could not decode image"), "{error}");
    }

    #[tokio::test]
    async fn failed_url_request_leaves_previous_designs() {
        let (ctl, _) = controller();
        ctl.select_category(Category::Mugs).await;
        ctl.upload_files(vec![png("first.png")]).await.unwrap();
        ctl.upload_files(vec![png("second.png"), png("nourl.png")]).await.unwrap();

        let state = ctl.snapshot();
        let kept: Vec<_> = state.designs().iter().map(|d| d.file_name.clone()).collect();
        assert_eq!(kept, vec!["first.png".to_string()]);
        assert!(state.error().is_some());
    }

    #[tokio::test]
    async fn upload_refused_before_a_category_is_chosen() {
        let (ctl, _) = controller();
        let err = ctl.upload_files(vec![png("a.png")]).await.unwrap_err();
        assert!(matches!(err, WizardError::NotAvailable { .. }));
    }

    #[tokio::test]
    async fn full_flow_reaches_results() {
        let (ctl, backend) = controller();
        ctl.select_category(Category::Mugs).await;
        ctl.upload_files(vec![png("d.png")]).await.unwrap();
        assert_eq!(ctl.generate().await.unwrap_err(), WizardError::NothingToGenerate);

        assert!(ctl.toggle_thumbnail("a.png"));
        ctl.generate().await.unwrap();

        let state = ctl.snapshot();
        assert_eq!(state.step(), WizardStep::Results);
        assert_eq!(state.mockups().len(), 1);
        assert_eq!(backend.generated.lock()[0], GenerateMockupsRequest {
            templates: vec!["a.png".into()],
            designs: vec!["designs/d.png".into()],
            category: Category::Mugs,
        });
        match ctl.screen().main {
            MainView::Results { mockups } => assert!(mockups[0].image_url.ends_with("/k1.png")),
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[tokio::test]
    async fn generation_failure_keeps_template_step() {
        let (ctl, _) = controller();
        ctl.select_category(Category::Mugs).await;
        ctl.upload_files(vec![png("d.png")]).await.unwrap();
        ctl.toggle_thumbnail("b.png");
        ctl.generate().await.unwrap();

        let state = ctl.snapshot();
        assert_eq!(state.step(), WizardStep::ThumbnailSelect);
        assert_eq!(state.error(), Some("Failed to generate mockups: HTTP error! status: 502"));
        assert!(!state.is_generating());
    }

    #[tokio::test]
    async fn abandoned_upload_does_not_leave_session_busy() {
        let (ctl, _) = controller();
        ctl.select_category(Category::Mugs).await;

        let upload = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.upload_files(vec![png("ok.png"), png("hang.png")]).await }
        });
        for _ in 0..50 {
            if ctl.snapshot().is_busy() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(ctl.snapshot().is_busy());

        upload.abort();
        assert!(upload.await.unwrap_err().is_cancelled());

        let state = ctl.snapshot();
        assert!(!state.is_busy());
        assert_eq!(state.step(), WizardStep::Upload);
        assert!(state.designs().is_empty());
        assert_eq!(state.error(), Some("Failed to process designs: upload was cancelled"));

        ctl.select_category(Category::Mugs).await;
        let state = ctl.snapshot();
        assert!(!state.is_busy());
        assert_eq!(state.error(), None);
        assert!(matches!(ctl.screen().main, MainView::Upload { .. }));
    }

    #[tokio::test]
    async fn unreachable_thumbnail_service_is_surfaced() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = WizardConfig { thumbnail_service_url: format!("http://{addr}"), ..WizardConfig::default() };
        let backend = crate::services::HttpBackend::new(&config).unwrap();
        let ctl = WizardController::new(Arc::new(backend), Arc::new(config));
        ctl.select_category(Category::Mugs).await;

        let state = ctl.snapshot();
        assert!(!state.is_busy());
        assert!(state.thumbnails().is_empty());
        let error = state.error().unwrap_or_default();
        assert!(error.starts_with("Failed to fetch thumbnails: "), "{error}");
        assert!(error.len() > "Failed to fetch thumbnails: ".len());
    }
}
