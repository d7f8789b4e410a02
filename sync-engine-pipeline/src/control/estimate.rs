//! Pre-flight sizing of a bulk migration.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use sync_engine_shared::EntityKind;

use super::items::MigrationItem;

const DEFAULT_SAMPLE_RATIO: f64 = 0.1;
const DEFAULT_MIN_SAMPLES: usize = 5;
const DEFAULT_SAFETY_MARGIN: f64 = 0.8;
const DEFAULT_ITEM_LATENCY: Duration = Duration::from_millis(50);
/// Source items and the rollback snapshot are both held in memory.
const MEMORY_COPIES: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

impl StorageEstimate {
    pub fn remaining(&self) -> u64 {
        self.quota.saturating_sub(self.usage)
    }
}

/// What the host can tell us about its resources. `None` means unknown.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn available_memory(&self) -> Option<u64>;
    async fn storage_estimate(&self) -> Option<StorageEstimate>;
    async fn durable_storage_available(&self) -> bool;
}

/// A probe that reports fixed values.
#[derive(Debug, Clone, Default)]
pub struct StaticResourceProbe {
    pub memory: Option<u64>,
    pub storage: Option<StorageEstimate>,
    pub durable_storage: bool,
}

impl StaticResourceProbe {
    /// Nothing is known to be limited.
    pub fn unbounded() -> Self {
        Self {
            memory: None,
            storage: None,
            durable_storage: true,
        }
    }

    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory = Some(bytes);
        self
    }

    pub fn with_storage(mut self, usage: u64, quota: u64) -> Self {
        self.storage = Some(StorageEstimate { usage, quota });
        self
    }

    pub fn with_durable_storage(mut self, available: bool) -> Self {
        self.durable_storage = available;
        self
    }
}

#[async_trait]
impl ResourceProbe for StaticResourceProbe {
    async fn available_memory(&self) -> Option<u64> {
        self.memory
    }

    async fn storage_estimate(&self) -> Option<StorageEstimate> {
        self.storage
    }

    async fn durable_storage_available(&self) -> bool {
        self.durable_storage
    }
}

#[derive(Debug, Clone)]
pub struct EstimateOptions {
    /// Fraction of each collection to sample.
    pub sample_ratio: f64,
    pub min_samples_per_kind: usize,
    /// Projected usage must stay below this fraction of what is available.
    pub safety_margin: f64,
    pub item_latency: Duration,
    pub batch_size: usize,
    pub writes_per_minute: u32,
    /// Fixed seed for reproducible sampling.
    pub seed: Option<u64>,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            sample_ratio: DEFAULT_SAMPLE_RATIO,
            min_samples_per_kind: DEFAULT_MIN_SAMPLES,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            item_latency: DEFAULT_ITEM_LATENCY,
            batch_size: 10,
            writes_per_minute: 10,
            seed: None,
        }
    }
}

impl EstimateOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sample_ratio(mut self, ratio: f64) -> Self {
        self.sample_ratio = ratio;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resource", rename_all = "camelCase")]
pub enum ResourceRisk {
    Memory { required: u64, available: u64 },
    Storage { required: u64, remaining: u64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationEstimate {
    pub total_items: usize,
    pub items_by_kind: BTreeMap<EntityKind, usize>,
    pub sampled_items: usize,
    pub projected_bytes: u64,
    pub projected_duration: Duration,
    pub coefficient_of_variation: f64,
    pub confidence: Confidence,
    pub risks: Vec<ResourceRisk>,
}

impl MigrationEstimate {
    pub fn is_risky(&self) -> bool {
        !self.risks.is_empty()
    }
}

struct Stratum {
    population: usize,
    sizes: Vec<f64>,
}

impl Stratum {
    fn mean(&self) -> f64 {
        if self.sizes.is_empty() {
            return 0.0;
        }
        self.sizes.iter().sum::<f64>() / self.sizes.len() as f64
    }

    fn coefficient_of_variation(&self) -> f64 {
        let mean = self.mean();
        if self.sizes.len() < 2 || mean == 0.0 {
            return 0.0;
        }
        let variance = self
            .sizes
            .iter()
            .map(|size| (size - mean).powi(2))
            .sum::<f64>()
            / (self.sizes.len() - 1) as f64;
        variance.sqrt() / mean
    }
}

fn sample_size(population: usize, options: &EstimateOptions) -> usize {
    let by_ratio = (population as f64 * options.sample_ratio).ceil() as usize;
    by_ratio.max(options.min_samples_per_kind).min(population)
}

fn confidence(sampling_ratio: f64, cv: f64) -> Confidence {
    if sampling_ratio >= 0.5 || (sampling_ratio >= 0.2 && cv <= 0.5) {
        Confidence::High
    } else if sampling_ratio >= 0.05 && cv <= 1.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn projected_duration(total_items: usize, options: &EstimateOptions) -> Duration {
    let writing = options.item_latency * total_items as u32;
    if options.writes_per_minute == 0 || options.batch_size == 0 {
        return writing;
    }
    let batches = total_items.div_ceil(options.batch_size);
    // The first window's worth of batches goes out immediately.
    let full_windows = batches.saturating_sub(1) / options.writes_per_minute as usize;
    writing + Duration::from_secs(60 * full_windows as u64)
}

/// Sample every collection of `items` and project the cost of writing them.
pub async fn estimate_items(
    items: &[MigrationItem],
    options: &EstimateOptions,
    probe: &dyn ResourceProbe,
) -> MigrationEstimate {
    let mut by_kind: BTreeMap<EntityKind, Vec<&MigrationItem>> = BTreeMap::new();
    for item in items {
        by_kind.entry(item.kind()).or_default().push(item);
    }

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let strata: Vec<Stratum> = by_kind
        .values()
        .map(|members| {
            let amount = sample_size(members.len(), options);
            let sizes = sample(&mut rng, members.len(), amount)
                .into_iter()
                .map(|index| members[index].encoded_len() as f64)
                .collect();
            Stratum {
                population: members.len(),
                sizes,
            }
        })
        .collect();

    let total_items = items.len();
    let sampled_items: usize = strata.iter().map(|s| s.sizes.len()).sum();
    let projected_bytes = strata
        .iter()
        .map(|s| s.mean() * s.population as f64)
        .sum::<f64>()
        .round() as u64;

    let (sampling_ratio, cv) = if total_items == 0 {
        (1.0, 0.0)
    } else {
        let weighted_cv = strata
            .iter()
            .map(|s| s.coefficient_of_variation() * s.population as f64)
            .sum::<f64>()
            / total_items as f64;
        (sampled_items as f64 / total_items as f64, weighted_cv)
    };

    let mut risks = Vec::new();
    if let Some(available) = probe.available_memory().await {
        let required = projected_bytes.saturating_mul(MEMORY_COPIES);
        if required as f64 > available as f64 * options.safety_margin {
            risks.push(ResourceRisk::Memory {
                required,
                available,
            });
        }
    }
    if let Some(storage) = probe.storage_estimate().await {
        let remaining = storage.remaining();
        if projected_bytes as f64 > remaining as f64 * options.safety_margin {
            risks.push(ResourceRisk::Storage {
                required: projected_bytes,
                remaining,
            });
        }
    }

    MigrationEstimate {
        total_items,
        items_by_kind: by_kind
            .iter()
            .map(|(kind, members)| (*kind, members.len()))
            .collect(),
        sampled_items,
        projected_bytes,
        projected_duration: projected_duration(total_items, options),
        coefficient_of_variation: cv,
        confidence: confidence(sampling_ratio, cv),
        risks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_engine_shared::{AppSettings, Player};

    fn players(count: usize) -> Vec<MigrationItem> {
        (0..count)
            .map(|i| MigrationItem::Player(Player::new(format!("p{:04}", i), "Same Name")))
            .collect()
    }

    #[test]
    fn test_sample_size_has_floor_and_ceiling() {
        let options = EstimateOptions::default();
        assert_eq!(sample_size(3, &options), 3);
        assert_eq!(sample_size(20, &options), 5);
        assert_eq!(sample_size(200, &options), 20);
        assert_eq!(sample_size(0, &options), 0);
    }

    #[test]
    fn test_duration_accounts_for_rate_limit() {
        let options = EstimateOptions {
            item_latency: Duration::ZERO,
            ..EstimateOptions::default()
        };
        // 10 batches fit in the first window.
        assert_eq!(projected_duration(100, &options), Duration::ZERO);
        // 11 batches need one more window.
        assert_eq!(projected_duration(101, &options), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_small_dataset_is_fully_sampled() {
        let mut items = players(4);
        items.push(MigrationItem::Settings(AppSettings::default()));

        let estimate =
            estimate_items(&items, &EstimateOptions::default(), &StaticResourceProbe::unbounded())
                .await;

        assert_eq!(estimate.total_items, 5);
        assert_eq!(estimate.sampled_items, 5);
        assert_eq!(estimate.confidence, Confidence::High);
        let exact: usize = items.iter().map(|i| i.encoded_len()).sum();
        assert_eq!(estimate.projected_bytes, exact as u64);
        assert!(!estimate.is_risky());
    }

    #[tokio::test]
    async fn test_seeded_estimate_is_reproducible() {
        let items = players(500);
        let options = EstimateOptions::default().with_seed(7);
        let probe = StaticResourceProbe::unbounded();

        let first = estimate_items(&items, &options, &probe).await;
        let second = estimate_items(&items, &options, &probe).await;

        assert_eq!(first.sampled_items, 50);
        assert_eq!(first.projected_bytes, second.projected_bytes);
        assert_eq!(first.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_flags_memory_and_storage_risk() {
        let items = players(50);
        let probe = StaticResourceProbe::unbounded()
            .with_memory(100)
            .with_storage(900, 1_000);

        let estimate = estimate_items(&items, &EstimateOptions::default(), &probe).await;

        assert_eq!(estimate.risks.len(), 2);
        assert!(matches!(estimate.risks[0], ResourceRisk::Memory { available: 100, .. }));
        assert!(matches!(estimate.risks[1], ResourceRisk::Storage { remaining: 100, .. }));
    }
}
