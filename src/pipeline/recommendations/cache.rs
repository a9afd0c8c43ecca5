//! Similarity-keyed cache in front of the generative recommendation service.
//!
//! Lookup order: exact fingerprint, then the most similar live entry at or
//! above [`SIMILARITY_THRESHOLD`], then one guarded call to the generator.
//! Only batches that pass validation are stored. Bounded by capacity (least
//! recently used entry evicted) and by an optional maximum entry age.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::intelligence::types::ClinicalContext;
use crate::pipeline::inference::{guarded, CancelToken, TextGenerator};

use super::fingerprint::{similarity, FingerprintFields, SIMILARITY_THRESHOLD};
use super::prompt::{build_recommendation_prompt, RECOMMENDATION_SYSTEM_PROMPT};
use super::validator::parse_recommendations;
use super::RecommendationError;

pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// A validated batch of five recommendations and the context that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct CachedRecommendation {
    pub recommendations: Vec<String>,
    pub context: ClinicalContext,
    pub created_at: NaiveDateTime,
    /// 1.0 for a freshly generated batch.
    pub confidence: f64,
}

/// How a lookup was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    Exact,
    Similar,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheLookup {
    pub recommendations: Vec<String>,
    pub source: CacheSource,
    /// Similarity to the stored context for similar hits; 1.0 otherwise.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct CacheSlot {
    entry: CachedRecommendation,
    fields: FingerprintFields,
    last_used: u64,
}

#[derive(Default)]
struct CacheInner {
    slots: HashMap<String, CacheSlot>,
    tick: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn purge_expired(&mut self, now: NaiveDateTime, max_age: Option<TimeDelta>) {
        let Some(max_age) = max_age else {
            return;
        };
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now - slot.entry.created_at <= max_age);
        self.stats.expirations += (before - self.slots.len()) as u64;
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.slots.remove(&key);
            self.stats.evictions += 1;
            tracing::debug!(key = %key, "Recommendation cache evicted least recently used entry");
        }
    }
}

pub struct RecommendationCache {
    generator: Arc<dyn TextGenerator>,
    inner: Mutex<CacheInner>,
    capacity: usize,
    max_age: Option<TimeDelta>,
    timeout: Duration,
}

impl RecommendationCache {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            inner: Mutex::new(CacheInner::default()),
            capacity: DEFAULT_CAPACITY,
            max_age: None,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    /// Maximum number of entries; at least 1.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Entries older than `max_age` are never served.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age.and_then(|d| TimeDelta::from_std(d).ok());
        self
    }

    /// Bound on each call to the generator.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cached recommendations for `context`, generating them on a miss.
    ///
    /// A miss makes exactly one generator call. Service failures and
    /// rejected output are returned as errors and nothing is stored.
    pub async fn lookup(
        &self,
        context: &ClinicalContext,
        cancel: &CancelToken,
    ) -> Result<CacheLookup, RecommendationError> {
        if let Some(hit) = self.find(context)? {
            return Ok(hit);
        }

        let prompt = build_recommendation_prompt(context);
        let raw = guarded(
            self.generator.generate(RECOMMENDATION_SYSTEM_PROMPT, &prompt),
            self.timeout,
            cancel,
        )
        .await?;

        let recommendations = parse_recommendations(&raw).map_err(|e| {
            tracing::warn!(
                model = self.generator.model_name(),
                error = %e,
                "Generated recommendations failed validation"
            );
            e
        })?;

        self.store(context, recommendations.clone(), Local::now().naive_local())?;
        tracing::info!(
            model = self.generator.model_name(),
            "Generated recommendations cached"
        );

        Ok(CacheLookup {
            recommendations,
            source: CacheSource::Generated,
            confidence: 1.0,
        })
    }

    /// Cache-only lookup. Counts a miss when nothing qualifies.
    pub fn find(&self, context: &ClinicalContext) -> Result<Option<CacheLookup>, RecommendationError> {
        self.find_at(context, Local::now().naive_local())
    }

    pub fn find_at(
        &self,
        context: &ClinicalContext,
        now: NaiveDateTime,
    ) -> Result<Option<CacheLookup>, RecommendationError> {
        let fields = FingerprintFields::from_context(context);
        let key = fields.key();

        let mut guard = self.inner.lock().map_err(|_| RecommendationError::LockFailed)?;
        let inner = &mut *guard;
        inner.purge_expired(now, self.max_age);
        let tick = inner.next_tick();

        if let Some(slot) = inner.slots.get_mut(&key) {
            slot.last_used = tick;
            let recommendations = slot.entry.recommendations.clone();
            inner.stats.hits += 1;
            tracing::debug!(key = %key, "Recommendation cache exact hit");
            return Ok(Some(CacheLookup {
                recommendations,
                source: CacheSource::Exact,
                confidence: 1.0,
            }));
        }

        let best = inner
            .slots
            .iter()
            .map(|(k, slot)| (k.clone(), similarity(&fields, &slot.fields)))
            .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((best_key, score)) = best {
            if let Some(slot) = inner.slots.get_mut(&best_key) {
                slot.last_used = tick;
                let recommendations = slot.entry.recommendations.clone();
                inner.stats.similar_hits += 1;
                tracing::debug!(
                    key = %best_key,
                    similarity = score,
                    "Recommendation cache similar hit"
                );
                return Ok(Some(CacheLookup {
                    recommendations,
                    source: CacheSource::Similar,
                    confidence: score,
                }));
            }
        }

        inner.stats.misses += 1;
        Ok(None)
    }

    /// Store a batch after running it through the same validation as
    /// generated output. Replaces any entry with the same fingerprint.
    pub fn insert(
        &self,
        context: &ClinicalContext,
        recommendations: Vec<String>,
    ) -> Result<(), RecommendationError> {
        self.insert_at(context, recommendations, Local::now().naive_local())
    }

    pub fn insert_at(
        &self,
        context: &ClinicalContext,
        recommendations: Vec<String>,
        now: NaiveDateTime,
    ) -> Result<(), RecommendationError> {
        let validated = parse_recommendations(&recommendations.join("\n"))?;
        self.store(context, validated, now)
    }

    /// Write path for batches that already passed `parse_recommendations`.
    fn store(
        &self,
        context: &ClinicalContext,
        recommendations: Vec<String>,
        now: NaiveDateTime,
    ) -> Result<(), RecommendationError> {
        let fields = FingerprintFields::from_context(context);
        let key = fields.key();

        let mut guard = self.inner.lock().map_err(|_| RecommendationError::LockFailed)?;
        let inner = &mut *guard;
        inner.purge_expired(now, self.max_age);
        if !inner.slots.contains_key(&key) && inner.slots.len() >= self.capacity {
            inner.evict_lru();
        }
        let tick = inner.next_tick();
        inner.slots.insert(
            key,
            CacheSlot {
                entry: CachedRecommendation {
                    recommendations,
                    context: context.clone(),
                    created_at: now,
                    confidence: 1.0,
                },
                fields,
                last_used: tick,
            },
        );
        Ok(())
    }

    /// Snapshot of the entry stored under `context`'s exact fingerprint.
    pub fn get(&self, context: &ClinicalContext) -> Option<CachedRecommendation> {
        let key = FingerprintFields::from_context(context).key();
        let inner = self.inner.lock().ok()?;
        inner.slots.get(&key).map(|slot| slot.entry.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().map(|i| i.stats).unwrap_or_default()
    }

    /// Drop every entry. Stats are kept.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.slots.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::types::CareStatus;
    use crate::models::{Medication, RiskLevel};
    use crate::pipeline::inference::{cancel_pair, InferenceError, MockTextGenerator};
    use crate::pipeline::recommendations::ValidationError;

    const FIVE: &str = "1. Revisar a dose de varfarina e monitorar o INR diariamente.
2. Aferir sinais vitais a cada 4 horas e comunicar febre acima de 38 °C.
3. Manter analgesia regular e avaliar conforto durante o banho no leito.
4. Orientar o cuidador sobre mudança de decúbito a cada 2 horas.
5. Agendar retorno ambulatorial em 7 dias com hemograma de controle.";

    fn context(age: u32, diagnoses: &[&str], meds: &[&str]) -> ClinicalContext {
        ClinicalContext {
            age: Some(age),
            diagnoses: diagnoses.iter().map(|s| s.to_string()).collect(),
            risk_level: RiskLevel::Medium,
            latest_vitals: None,
            medications: meds.iter().map(|m| Medication::named(m)).collect(),
            procedures: Vec::new(),
            care_status: CareStatus {
                mobility: "Não Avaliado".into(),
                consciousness: "Não Avaliado".into(),
                pain_level: 0,
                nutrition: "Não Avaliado".into(),
                respiratory: "Não Avaliado".into(),
                special_needs: Vec::new(),
            },
        }
    }

    fn cache_with(mock: &Arc<MockTextGenerator>) -> RecommendationCache {
        RecommendationCache::new(mock.clone())
    }

    fn at(hour: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock);
        let ctx = context(70, &["Sepse"], &["warfarin"]);

        let first = cache.lookup(&ctx, &CancelToken::never()).await.unwrap();
        let second = cache.lookup(&ctx, &CancelToken::never()).await.unwrap();

        assert_eq!(mock.call_count(), 1);
        assert_eq!(first.source, CacheSource::Generated);
        assert_eq!(second.source, CacheSource::Exact);
        assert_eq!(first.recommendations, second.recommendations);
        assert_eq!(second.recommendations.len(), 5);
    }

    #[tokio::test]
    async fn similar_context_reuses_entry() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock);
        cache
            .lookup(&context(70, &["Sepse"], &["warfarin"]), &CancelToken::never())
            .await
            .unwrap();

        let near = cache
            .lookup(&context(73, &["sepse"], &["Warfarin"]), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 1);
        assert_eq!(near.source, CacheSource::Similar);
        assert!((near.confidence - 0.991).abs() < 1e-9);
        assert_eq!(cache.stats().similar_hits, 1);
    }

    #[tokio::test]
    async fn dissimilar_context_calls_service_again() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock);
        cache
            .lookup(&context(70, &["Sepse"], &["warfarin"]), &CancelToken::never())
            .await
            .unwrap();
        cache
            .lookup(&context(30, &["Fratura de fêmur"], &["dipirona"]), &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(mock.call_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn four_items_are_rejected_and_not_cached() {
        let four: String = FIVE.lines().take(4).collect::<Vec<_>>().join("\n");
        let mock = Arc::new(MockTextGenerator::new(&four));
        let cache = cache_with(&mock);
        let ctx = context(70, &["Sepse"], &[]);

        let err = cache.lookup(&ctx, &CancelToken::never()).await.unwrap_err();
        assert!(matches!(
            err,
            RecommendationError::Validation(ValidationError::WrongCount { found: 4, .. })
        ));
        assert!(cache.is_empty());

        // No partial write: the next lookup calls the service again.
        let _ = cache.lookup(&ctx, &CancelToken::never()).await;
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn service_failure_propagates_without_retry() {
        let mock = Arc::new(MockTextGenerator::failing(InferenceError::Connection(
            "http://localhost:11434".into(),
        )));
        let cache = cache_with(&mock);
        let err = cache
            .lookup(&context(70, &["Sepse"], &[]), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecommendationError::Inference(InferenceError::Connection(_))
        ));
        assert_eq!(mock.call_count(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_service_times_out() {
        let mock = Arc::new(MockTextGenerator::hanging());
        let cache = cache_with(&mock).with_timeout(Duration::from_secs(30));
        let err = cache
            .lookup(&context(70, &["Sepse"], &[]), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecommendationError::Inference(InferenceError::Timeout(d))
                if d == Duration::from_secs(30)
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_lookup() {
        let mock = Arc::new(MockTextGenerator::hanging());
        let cache = Arc::new(cache_with(&mock));
        let (handle, token) = cancel_pair();
        let task = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .lookup(&context(70, &["Sepse"], &[]), &token)
                    .await
                    .map(|l| l.recommendations)
            })
        };
        handle.cancel();
        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(RecommendationError::Inference(InferenceError::Cancelled))
        ));
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock).with_capacity(2);
        let recs: Vec<String> = FIVE.lines().map(String::from).collect();
        let a = context(20, &["Asma"], &["salbutamol"]);
        let b = context(50, &["Gota"], &["alopurinol"]);
        let c = context(80, &["Glaucoma"], &["timolol"]);

        cache.insert_at(&a, recs.clone(), at(8)).unwrap();
        cache.insert_at(&b, recs.clone(), at(8)).unwrap();
        // Touch a so b becomes least recently used.
        assert!(cache.find_at(&a, at(9)).unwrap().is_some());
        cache.insert_at(&c, recs, at(10)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entries_are_not_served() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock).with_max_age(Some(Duration::from_secs(3600)));
        let ctx = context(70, &["Sepse"], &[]);
        let recs: Vec<String> = FIVE.lines().map(String::from).collect();

        cache.insert_at(&ctx, recs, at(8)).unwrap();
        assert!(cache.find_at(&ctx, at(9)).unwrap().is_some());
        assert!(cache.find_at(&ctx, at(10)).unwrap().is_none());

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn reinserting_same_fingerprint_replaces_entry() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock).with_capacity(1);
        let ctx = context(70, &["Sepse"], &[]);
        let recs: Vec<String> = FIVE.lines().map(String::from).collect();
        cache.insert_at(&ctx, recs.clone(), at(8)).unwrap();
        cache.insert_at(&ctx, recs, at(9)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&ctx).unwrap().created_at, at(9));
    }

    #[tokio::test]
    async fn invalid_batch_is_refused_on_insert() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock);
        let ctx = context(70, &["Sepse"], &[]);

        let err = cache
            .insert(&ctx, vec!["null".into(), "x".into()])
            .unwrap_err();
        assert!(matches!(
            err,
            RecommendationError::Validation(ValidationError::WrongCount { found: 0, .. })
        ));

        let mut tainted: Vec<String> = FIVE.lines().map(String::from).collect();
        tainted[2] = "3. Registrar valor null no prontuário do paciente.".into();
        let err = cache.insert(&ctx, tainted).unwrap_err();
        assert!(matches!(
            err,
            RecommendationError::Validation(ValidationError::ForbiddenToken { position: 3, .. })
        ));
        assert!(cache.is_empty());

        let served = cache.lookup(&ctx, &CancelToken::never()).await.unwrap();
        assert_eq!(served.source, CacheSource::Generated);
        assert_eq!(served.recommendations.len(), 5);
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn inserted_batch_is_stored_in_canonical_form() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock);
        let ctx = context(70, &["Sepse"], &[]);
        let padded: Vec<String> = FIVE.lines().map(|l| format!("  {l}  ")).collect();
        cache.insert(&ctx, padded).unwrap();
        let stored = cache.get(&ctx).unwrap();
        assert_eq!(stored.recommendations, parse_recommendations(FIVE).unwrap());
    }

    #[test]
    fn clear_empties_cache() {
        let mock = Arc::new(MockTextGenerator::new(FIVE));
        let cache = cache_with(&mock);
        let recs: Vec<String> = FIVE.lines().map(String::from).collect();
        cache.insert(&context(70, &["Sepse"], &[]), recs).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
