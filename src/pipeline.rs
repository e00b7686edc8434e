use crate::catalog::CatalogStore;
use crate::checkpoint::{CheckpointStore, CompletedImage};
use crate::fragdb::{DesignerPage, assets, listing};
use crate::http::build_client;
use crate::imaging;
use crate::matcher::{self, MatchOutcome};
use crate::metrics;
use crate::models::{LocalProduct, MatchRecord, PhaseReport, RunSummary};
use crate::normalize::{self, Normalizer};
use crate::products;
use crate::rules::Rules;
use crate::store::StoreError;
use rand::Rng;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub images_dir: PathBuf,
    pub request_delay: Duration,
    pub request_jitter: Duration,
    pub backoff_interval: Duration,
    pub checkpoint_flush_every: usize,
    pub products_refresh_every: usize,
    pub match_threshold: f64,
    pub max_groups: Option<usize>,
    pub max_namespaces: Option<usize>,
    pub dry_run: bool,
}

impl PipelineConfig {
    pub fn new(data_dir: PathBuf, images_dir: PathBuf) -> Self {
        Self {
            data_dir,
            images_dir,
            request_delay: Duration::from_secs_f64(env_f64("SILLAGE_DELAY_SECS", 5.0)),
            request_jitter: Duration::from_secs_f64(env_f64("SILLAGE_JITTER_SECS", 2.0)),
            // Empirically tuned against the remote's block duration; no
            // deeper derivation exists, so it stays a plain knob.
            backoff_interval: Duration::from_secs_f64(env_f64("SILLAGE_BACKOFF_SECS", 300.0)),
            checkpoint_flush_every: 10,
            products_refresh_every: 100,
            match_threshold: env_f64("SILLAGE_MATCH_THRESHOLD", matcher::DEFAULT_THRESHOLD),
            max_groups: None,
            max_namespaces: None,
            dry_run: false,
        }
    }

    pub fn products_path(&self) -> PathBuf {
        self.data_dir.join("products.json")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join("checkpoint.json")
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| *value >= 0.0)
        .unwrap_or(default)
}

#[derive(Debug, Error)]
#[error("phase `{phase}` failed: {message}")]
pub struct PipelineError {
    phase: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    CorruptState,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(phase: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn corrupt_state(phase: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            kind: PipelineErrorKind::CorruptState,
        }
    }

    pub fn internal(phase: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    fn from_store(phase: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::Corrupt { .. } => Self::corrupt_state(phase, err.to_string()),
            StoreError::Missing { .. } => Self::invalid_input(phase, err.to_string()),
            _ => Self::internal(phase, err.to_string()),
        }
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct PhaseOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> PhaseOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScrapeStats {
    pub scraped: u64,
    pub cached: u64,
    pub empty: u64,
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadStats {
    pub downloaded: u64,
    pub missed: u64,
    pub skipped: u64,
}

/// The four-phase state machine. Each phase is independently resumable:
/// scraping skips namespaces already mirrored, matching is recomputed
/// (pure and cheap), downloading skips checkpointed group keys, and
/// finalize rejoins completions onto the product records.
pub struct Pipeline {
    config: PipelineConfig,
    rules: Rules,
    normalizer: Normalizer,
    client: Client,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, rules: Rules) -> Result<Self, PipelineError> {
        let normalizer = Normalizer::new(&rules)
            .map_err(|err| PipelineError::invalid_input("setup", err.to_string()))?;
        Ok(Self {
            config,
            rules,
            normalizer,
            client: build_client(),
        })
    }

    pub async fn run(&self, local: &mut Vec<LocalProduct>) -> Result<RunSummary, PipelineError> {
        let groups = normalize::group_products(local, &self.normalizer);
        info!(
            target = "sillage.pipeline",
            products = local.len(),
            groups = groups.len(),
            "pipeline starting"
        );

        let mut catalog = CatalogStore::load(&self.config.catalog_path())
            .map_err(|err| PipelineError::from_store("scrape_catalog", err))?;
        let mut checkpoint = CheckpointStore::load(&self.config.checkpoint_path())
            .map_err(|err| PipelineError::from_store("download_images", err))?;

        let mut phases = Vec::new();

        if self.config.dry_run {
            let outcome = self.plan(&groups, local, &catalog, &checkpoint);
            self.capture_phase("plan", &mut phases, async move { Ok(outcome) })
                .await?;
            return Ok(RunSummary {
                phases,
                downloaded: 0,
                missed: 0,
                completed_total: checkpoint.record.completed.len(),
                groups_total: groups.len(),
            });
        }

        let scrape = {
            let fut = self.scrape_catalog(&groups, local, &mut catalog, &mut checkpoint);
            self.capture_phase("scrape_catalog", &mut phases, fut).await?
        };

        let matched = {
            let fut = self.match_catalog(&groups, local, &catalog);
            self.capture_phase("match_catalog", &mut phases, fut).await?
        };
        checkpoint.record.stats.matched = matched.matches.len() as u64;

        let downloads = {
            let fut = self.download_images(&groups, &matched.matches, &mut checkpoint, local);
            self.capture_phase("download_images", &mut phases, fut)
                .await?
        };

        let with_images = {
            let fut = self.finalize(local, &checkpoint);
            self.capture_phase("finalize", &mut phases, fut).await?
        };

        if scrape.aborted {
            warn!(
                target = "sillage.pipeline",
                "crawl ended early while the listing origin was blocked; rerun to continue"
            );
        }
        info!(
            target = "sillage.pipeline",
            downloaded = downloads.downloaded,
            missed = downloads.missed,
            with_images = with_images,
            "pipeline complete"
        );

        Ok(RunSummary {
            phases,
            downloaded: downloads.downloaded,
            missed: downloads.missed,
            completed_total: checkpoint.record.completed.len(),
            groups_total: groups.len(),
        })
    }

    fn plan(
        &self,
        groups: &BTreeMap<String, Vec<usize>>,
        local: &[LocalProduct],
        catalog: &CatalogStore,
        checkpoint: &CheckpointStore,
    ) -> PhaseOutcome<()> {
        let slugs = self.needed_namespaces(groups, local);
        let namespaces = pending_namespaces(&slugs, catalog);
        let pending = pending_downloads(groups, checkpoint, self.config.max_groups);
        let preview: Vec<&str> = pending.iter().take(20).map(|key| key.as_str()).collect();
        PhaseOutcome::new(
            (),
            json!({
                "groups_total": groups.len(),
                "completed": checkpoint.record.completed.len(),
                "failed": checkpoint.record.failed.len(),
                "pending_groups": pending.len(),
                "pending_namespaces": namespaces,
                "preview": preview,
                "max_groups": self.config.max_groups,
                "max_namespaces": self.config.max_namespaces,
            }),
        )
    }

    async fn scrape_catalog(
        &self,
        groups: &BTreeMap<String, Vec<usize>>,
        local: &[LocalProduct],
        catalog: &mut CatalogStore,
        checkpoint: &mut CheckpointStore,
    ) -> Result<PhaseOutcome<ScrapeStats>, PipelineError> {
        let slugs = self.needed_namespaces(groups, local);
        let mut pending = pending_namespaces(&slugs, catalog);
        let mut stats = ScrapeStats {
            cached: (slugs.len() - pending.len()) as u64,
            ..ScrapeStats::default()
        };
        if let Some(limit) = self.config.max_namespaces {
            pending.truncate(limit);
        }

        if !pending.is_empty() {
            info!(
                target = "sillage.crawl",
                pending = pending.len(),
                cached = stats.cached,
                "scraping designer listings"
            );
            if !listing::probe(&self.client, &self.rules).await {
                info!(
                    target = "sillage.crawl",
                    "listing origin blocked before start"
                );
                self.backoff_until_clear().await;
            }

            for slug in &pending {
                checkpoint.record.stats.searched += 1;
                let mut page = listing::fetch_designer(&self.client, slug, &self.rules).await;
                if page == DesignerPage::RateLimited {
                    warn!(
                        target = "sillage.crawl",
                        namespace = slug.as_str(),
                        "listing_blocked"
                    );
                    self.backoff_until_clear().await;
                    page = listing::fetch_designer(&self.client, slug, &self.rules).await;
                }
                match page {
                    DesignerPage::RateLimited => {
                        // A second block right after a completed wait means
                        // the remote is not letting us back in; keep what
                        // we have and end the phase.
                        warn!(
                            target = "sillage.crawl",
                            namespace = slug.as_str(),
                            "still blocked after wait; ending scrape phase"
                        );
                        stats.aborted = true;
                        break;
                    }
                    DesignerPage::Listed(entries) => {
                        info!(
                            target = "sillage.crawl",
                            namespace = slug.as_str(),
                            entries = entries.len(),
                            "namespace_scraped"
                        );
                        catalog.insert(slug, entries);
                        stats.scraped += 1;
                    }
                    DesignerPage::Empty => {
                        // Cached as empty so it is not re-fetched every run.
                        catalog.insert(slug, Vec::new());
                        stats.empty += 1;
                    }
                }
                catalog
                    .save()
                    .map_err(|err| PipelineError::from_store("scrape_catalog", err))?;
                self.pause().await;
            }
            checkpoint
                .save()
                .map_err(|err| PipelineError::from_store("scrape_catalog", err))?;
        }

        let output = json!({
            "namespaces_needed": slugs.len(),
            "cached": stats.cached,
            "scraped": stats.scraped,
            "empty": stats.empty,
            "aborted": stats.aborted,
            "catalog_entries": catalog.entry_count(),
        });
        Ok(PhaseOutcome::new(stats, output))
    }

    async fn match_catalog(
        &self,
        groups: &BTreeMap<String, Vec<usize>>,
        local: &[LocalProduct],
        catalog: &CatalogStore,
    ) -> Result<PhaseOutcome<MatchOutcome>, PipelineError> {
        let outcome = matcher::match_groups(
            groups,
            local,
            catalog,
            &self.rules,
            &self.normalizer,
            self.config.match_threshold,
        );
        info!(
            target = "sillage.match",
            matched = outcome.matches.len(),
            unmatched = outcome.unmatched,
            unresolved = outcome.unresolved,
            "matching complete"
        );
        let output = json!({
            "groups": groups.len(),
            "matched": outcome.matches.len(),
            "unmatched": outcome.unmatched,
            "unresolved": outcome.unresolved,
            "threshold": self.config.match_threshold,
        });
        Ok(PhaseOutcome::new(outcome, output))
    }

    async fn download_images(
        &self,
        groups: &BTreeMap<String, Vec<usize>>,
        matches: &BTreeMap<String, MatchRecord>,
        checkpoint: &mut CheckpointStore,
        local: &mut [LocalProduct],
    ) -> Result<PhaseOutcome<DownloadStats>, PipelineError> {
        let all_pending = pending_downloads(groups, checkpoint, None).len();
        let todo = pending_downloads(groups, checkpoint, self.config.max_groups);
        let total = todo.len();
        let mut stats = DownloadStats {
            skipped: (groups.len() - all_pending) as u64,
            ..DownloadStats::default()
        };

        if total == 0 {
            checkpoint
                .save()
                .map_err(|err| PipelineError::from_store("download_images", err))?;
            let output = json!({
                "total": 0,
                "downloaded": 0,
                "missed": 0,
                "skipped": stats.skipped,
            });
            return Ok(PhaseOutcome::new(stats, output));
        }

        std::fs::create_dir_all(&self.config.images_dir)
            .map_err(|err| PipelineError::internal("download_images", err.to_string()))?;

        let started = Instant::now();
        let mut processed = 0usize;
        for key in todo {
            processed += 1;
            let members = groups.get(key).map(Vec::len).unwrap_or(0);
            let rate = processed as f64 / started.elapsed().as_secs_f64().max(1.0);
            let eta_min = ((total - processed) as f64 / rate.max(0.001) / 60.0) as u64;
            info!(
                target = "sillage.images",
                item = processed,
                of = total,
                group = key.as_str(),
                products = members,
                ok = stats.downloaded,
                missed = stats.missed,
                eta_min = eta_min,
                "processing group"
            );

            match matches.get(key) {
                None => {
                    checkpoint.record_failed(key);
                    stats.missed += 1;
                }
                Some(record) => {
                    self.fetch_one(key, record, checkpoint, &mut stats).await;
                    self.pause().await;
                }
            }

            if processed % self.config.checkpoint_flush_every == 0 {
                checkpoint
                    .save()
                    .map_err(|err| PipelineError::from_store("download_images", err))?;
            }
            if processed % self.config.products_refresh_every == 0 {
                self.write_annotated(local, checkpoint)
                    .map_err(|err| PipelineError::from_store("download_images", err))?;
            }
        }
        checkpoint
            .save()
            .map_err(|err| PipelineError::from_store("download_images", err))?;

        let output = json!({
            "total": total,
            "downloaded": stats.downloaded,
            "missed": stats.missed,
            "skipped": stats.skipped,
        });
        Ok(PhaseOutcome::new(stats, output))
    }

    async fn fetch_one(
        &self,
        key: &str,
        record: &MatchRecord,
        checkpoint: &mut CheckpointStore,
        stats: &mut DownloadStats,
    ) {
        let Some(bytes) = assets::download_image(&self.client, &record.image_url).await else {
            checkpoint.record_failed(key);
            stats.missed += 1;
            return;
        };
        let encoded = match imaging::transform(&bytes) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(target = "sillage.images", group = key, error = %err, "transform_failed");
                checkpoint.record_failed(key);
                stats.missed += 1;
                return;
            }
        };
        let filename = imaging::image_filename(key);
        let path = self.config.images_dir.join(&filename);
        if let Err(err) = std::fs::write(&path, &encoded) {
            warn!(target = "sillage.images", group = key, error = %err, "image_write_failed");
            checkpoint.record_failed(key);
            stats.missed += 1;
            return;
        }
        info!(
            target = "sillage.images",
            file = filename.as_str(),
            bytes = encoded.len(),
            "image_written"
        );
        checkpoint.record_completed(
            key,
            format!("/images/products/{filename}"),
            record.remote_url.clone(),
        );
        stats.downloaded += 1;
    }

    async fn finalize(
        &self,
        local: &mut [LocalProduct],
        checkpoint: &CheckpointStore,
    ) -> Result<PhaseOutcome<usize>, PipelineError> {
        let with_images = self
            .write_annotated(local, checkpoint)
            .map_err(|err| PipelineError::from_store("finalize", err))?;
        let output = json!({
            "products": local.len(),
            "with_images": with_images,
        });
        Ok(PhaseOutcome::new(with_images, output))
    }

    fn write_annotated(
        &self,
        local: &mut [LocalProduct],
        checkpoint: &CheckpointStore,
    ) -> Result<usize, StoreError> {
        let with_images =
            apply_completed(local, &self.normalizer, &checkpoint.record.completed);
        products::save(&self.config.products_path(), local)?;
        info!(
            target = "sillage.pipeline",
            with_images = with_images,
            total = local.len(),
            "products file updated"
        );
        Ok(with_images)
    }

    fn needed_namespaces(
        &self,
        groups: &BTreeMap<String, Vec<usize>>,
        local: &[LocalProduct],
    ) -> BTreeSet<String> {
        let mut slugs = BTreeSet::new();
        for members in groups.values() {
            if let Some(idx) = members.first()
                && let Some(slug) = self.rules.resolve(&local[*idx].brand)
            {
                slugs.insert(slug.to_string());
            }
        }
        slugs
    }

    /// Sleeps the backoff interval, then probes with the canary request;
    /// repeats until the remote serves regular content again. Unbounded on
    /// purpose: blocking is waited out, not failed.
    async fn backoff_until_clear(&self) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            info!(
                target = "sillage.crawl",
                attempt = attempt,
                wait_secs = self.config.backoff_interval.as_secs(),
                "waiting for block to clear"
            );
            sleep(self.config.backoff_interval).await;
            if listing::probe(&self.client, &self.rules).await {
                info!(target = "sillage.crawl", attempt = attempt, "block cleared");
                return;
            }
        }
    }

    async fn pause(&self) {
        let mut delay = self.config.request_delay;
        let jitter = self.config.request_jitter.as_secs_f64();
        if jitter > 0.0 {
            delay += Duration::from_secs_f64(rand::rng().random_range(0.0..jitter));
        }
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    async fn capture_phase<T, Fut>(
        &self,
        name: &'static str,
        phases: &mut Vec<PhaseReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<PhaseOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        metrics::phase_elapsed(name, elapsed_ms);
        phases.push(PhaseReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

/// Namespaces that still need a listing fetch: resolved slugs not yet in
/// the catalog store. Everything already mirrored is a cache hit.
pub fn pending_namespaces(slugs: &BTreeSet<String>, catalog: &CatalogStore) -> Vec<String> {
    slugs
        .iter()
        .filter(|slug| !catalog.contains(slug))
        .cloned()
        .collect()
}

/// Group keys still needing an image: everything not already completed or
/// failed in the checkpoint, in deterministic group order.
pub fn pending_downloads<'a>(
    groups: &'a BTreeMap<String, Vec<usize>>,
    checkpoint: &CheckpointStore,
    limit: Option<usize>,
) -> Vec<&'a String> {
    let pending = groups.keys().filter(|key| !checkpoint.is_done(key));
    match limit {
        Some(limit) => pending.take(limit).collect(),
        None => pending.collect(),
    }
}

/// Joins completions back onto every product sharing the group key and
/// returns how many rows now carry an image.
pub fn apply_completed(
    local: &mut [LocalProduct],
    normalizer: &Normalizer,
    completed: &BTreeMap<String, CompletedImage>,
) -> usize {
    for product in local.iter_mut() {
        let Some(key) = normalizer.group_key(&product.raw_name) else {
            continue;
        };
        if let Some(done) = completed.get(&key) {
            product.image_url = Some(done.image_file.clone());
            product.has_image = true;
        }
    }
    local.iter().filter(|product| product.has_image).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogEntry;

    fn product(raw_name: &str, brand: &str) -> LocalProduct {
        LocalProduct {
            id: raw_name.to_lowercase().replace(' ', "-"),
            raw_name: raw_name.into(),
            brand: brand.into(),
            name: raw_name.into(),
            size: None,
            fragrance_type: None,
            gender: "unisex".into(),
            price: Some(99.0),
            upc: String::new(),
            is_gift_set: false,
            is_tester: false,
            image_url: None,
            has_image: false,
        }
    }

    fn entry(id: u64, name: &str) -> CatalogEntry {
        CatalogEntry {
            display_name: name.into(),
            remote_id: id,
            remote_url: format!("https://example.test/perfume/Chanel/{id}.html"),
            has_image: true,
        }
    }

    fn test_pipeline(data_dir: PathBuf, images_dir: PathBuf, dry_run: bool) -> Pipeline {
        let mut config = PipelineConfig::new(data_dir, images_dir);
        config.request_delay = Duration::ZERO;
        config.request_jitter = Duration::ZERO;
        config.dry_run = dry_run;
        let rules = Rules::load().expect("embedded rules");
        Pipeline::new(config, rules).expect("pipeline")
    }

    #[test]
    fn pending_namespaces_skips_mirrored_slugs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut catalog = CatalogStore::load(&dir.path().join("catalog.json")).expect("load");
        catalog.insert("Chanel", vec![entry(28, "Chanel No. 5")]);

        let slugs: BTreeSet<String> = ["Chanel", "Versace"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(pending_namespaces(&slugs, &catalog), vec!["Versace"]);
    }

    #[test]
    fn pending_downloads_skips_checkpointed_keys_and_honors_the_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut checkpoint =
            CheckpointStore::load(&dir.path().join("checkpoint.json")).expect("load");
        checkpoint.record_completed("A Scent", "/images/products/a.jpg".into(), "u".into());
        checkpoint.record_failed("B Scent");

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for key in ["A Scent", "B Scent", "C Scent", "D Scent"] {
            groups.insert(key.to_string(), vec![0]);
        }

        let pending = pending_downloads(&groups, &checkpoint, None);
        assert_eq!(pending, vec!["C Scent", "D Scent"]);
        assert_eq!(pending_downloads(&groups, &checkpoint, Some(1)).len(), 1);
    }

    #[test]
    fn apply_completed_joins_by_group_key() {
        let rules = Rules::load().expect("embedded rules");
        let normalizer = Normalizer::new(&rules).expect("normalizer");
        let mut local = vec![
            product("Chanel No. 5 EDP 3.4 oz", "Chanel"),
            product("Chanel No. 5 EDT 1.7 oz", "Chanel"),
            product("Versace Eros EDT 3.4 oz", "Versace"),
        ];
        let mut completed = BTreeMap::new();
        completed.insert(
            "Chanel No. 5".to_string(),
            CompletedImage {
                image_file: "/images/products/chanel-no-5-abc123.jpg".into(),
                remote_url: "https://example.test/28.html".into(),
            },
        );

        let with_images = apply_completed(&mut local, &normalizer, &completed);
        assert_eq!(with_images, 2);
        assert!(local[0].has_image && local[1].has_image);
        assert!(!local[2].has_image);
        assert_eq!(
            local[0].image_url.as_deref(),
            Some("/images/products/chanel-no-5-abc123.jpg")
        );
    }

    #[tokio::test]
    async fn dry_run_reports_a_plan_without_side_effects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        let images_dir = dir.path().join("images");
        let mut local = vec![product("Chanel No. 5 EDP 3.4 oz", "Chanel")];
        products::save(&data_dir.join("products.json"), &local).expect("seed products");

        let pipeline = test_pipeline(data_dir.clone(), images_dir.clone(), true);
        let summary = pipeline.run(&mut local).await.expect("run");

        assert_eq!(summary.phases.len(), 1);
        assert_eq!(summary.phases[0].name, "plan");
        assert_eq!(summary.phases[0].output["pending_groups"], json!(1));
        assert!(!data_dir.join("catalog.json").exists());
        assert!(!data_dir.join("checkpoint.json").exists());
        assert!(!images_dir.exists());
    }

    #[tokio::test]
    async fn corrupt_durable_state_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        let mut local = vec![product("Chanel No. 5 EDP 3.4 oz", "Chanel")];
        products::save(&data_dir.join("products.json"), &local).expect("seed products");
        std::fs::write(data_dir.join("checkpoint.json"), "{not valid").expect("write");

        let pipeline = test_pipeline(data_dir, dir.path().join("images"), false);
        let err = pipeline.run(&mut local).await.expect_err("corrupt state");
        assert_eq!(err.kind(), PipelineErrorKind::CorruptState);
        assert_eq!(err.phase(), "download_images");
        assert!(err.detail().contains("corrupt"));
    }

    #[tokio::test]
    async fn cached_namespaces_and_completed_keys_need_no_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        let images_dir = dir.path().join("images");
        let mut local = vec![
            product("Chanel No. 5 EDP 3.4 oz", "Chanel"),
            product("Chanel No. 5 EDT 1.7 oz", "Chanel"),
        ];
        products::save(&data_dir.join("products.json"), &local).expect("seed products");

        // Namespace already mirrored and the one group already completed:
        // the whole run must finish without touching the network.
        let mut catalog = CatalogStore::load(&data_dir.join("catalog.json")).expect("load");
        catalog.insert(
            "Chanel",
            vec![entry(28, "Chanel No. 5"), entry(31, "Chanel No. 5 L'Eau")],
        );
        catalog.save().expect("save catalog");
        let mut checkpoint =
            CheckpointStore::load(&data_dir.join("checkpoint.json")).expect("load");
        checkpoint.record_completed(
            "Chanel No. 5",
            "/images/products/chanel-no-5-abc123.jpg".into(),
            "https://example.test/28.html".into(),
        );
        checkpoint.save().expect("save checkpoint");

        let pipeline = test_pipeline(data_dir.clone(), images_dir, false);
        let summary = pipeline.run(&mut local).await.expect("run");

        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.missed, 0);
        assert_eq!(summary.completed_total, 1);
        assert_eq!(summary.groups_total, 1);

        let names: Vec<&str> = summary.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "scrape_catalog",
                "match_catalog",
                "download_images",
                "finalize"
            ]
        );
        assert_eq!(summary.phases[0].output["cached"], json!(1));
        assert_eq!(summary.phases[0].output["scraped"], json!(0));
        assert_eq!(summary.phases[1].output["matched"], json!(1));
        assert_eq!(summary.phases[2].output["total"], json!(0));

        assert!(local.iter().all(|p| p.has_image));
        let rewritten = products::load(&data_dir.join("products.json")).expect("reload");
        assert!(rewritten.iter().all(|p| p.has_image));
    }
}
