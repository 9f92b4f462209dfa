//! Route prototype vectors

use crate::decision::Route;
use crate::error::{Error, Result};
use dualrag_llm::{cosine_similarity, normalize, EmbeddingProvider};
use tracing::{debug, info, instrument};

/// One normalized centroid per declared route plus the tie-break order
///
/// Built once and shared behind an `Arc`; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PrototypeCache {
    prototypes: Vec<(Route, Vec<f32>)>,
    priority: Vec<Route>,
    dimensions: usize,
}

impl PrototypeCache {
    /// Embed every phrase and average each route's vectors into its prototype
    #[instrument(skip_all, fields(embedder = %embedder.name()))]
    pub async fn build(
        embedder: &dyn EmbeddingProvider,
        phrases: &[(Route, Vec<String>)],
        priority: Vec<Route>,
    ) -> Result<Self> {
        let mut prototypes = Vec::with_capacity(phrases.len());

        for (route, texts) in phrases {
            let vectors = embedder
                .embed_batch(texts)
                .await
                .map_err(|e| Error::Embedding(format!("prototype `{route}`: {e}")))?;
            let centroid = centroid(*route, &vectors)?;
            debug!(route = %route, phrases = texts.len(), "Prototype computed");
            prototypes.push((*route, centroid));
        }

        let cache = Self::from_vectors(prototypes, priority)?;
        info!(
            routes = cache.prototypes.len(),
            dimensions = cache.dimensions,
            "Prototype cache built"
        );
        Ok(cache)
    }

    /// Build from precomputed vectors; each is normalized
    pub fn from_vectors(prototypes: Vec<(Route, Vec<f32>)>, priority: Vec<Route>) -> Result<Self> {
        let dimensions = prototypes
            .first()
            .map(|(_, v)| v.len())
            .ok_or_else(|| Error::Configuration("no route prototypes".to_string()))?;
        if dimensions == 0 {
            return Err(Error::Embedding("prototype vectors are empty".to_string()));
        }

        let mut normalized: Vec<(Route, Vec<f32>)> = Vec::with_capacity(prototypes.len());
        for (route, mut vector) in prototypes {
            if !route.is_declared() {
                return Err(Error::Configuration(
                    "route `none` cannot have a prototype".to_string(),
                ));
            }
            if normalized.iter().any(|(r, _)| *r == route) {
                return Err(Error::Configuration(format!(
                    "duplicate prototype for route `{route}`"
                )));
            }
            if vector.len() != dimensions {
                return Err(Error::Embedding(format!(
                    "prototype `{route}` has {} dimensions, expected {dimensions}",
                    vector.len()
                )));
            }
            normalize(&mut vector);
            normalized.push((route, vector));
        }

        for route in &priority {
            if !normalized.iter().any(|(r, _)| r == route) {
                return Err(Error::Configuration(format!(
                    "priority lists `{route}` but it has no prototype"
                )));
            }
        }
        if priority.len() != normalized.len() {
            return Err(Error::Configuration(
                "priority must rank every prototype route".to_string(),
            ));
        }

        Ok(Self {
            prototypes: normalized,
            priority,
            dimensions,
        })
    }

    /// Vector dimension shared by every prototype
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Routes in tie-break order
    #[must_use]
    pub fn priority(&self) -> &[Route] {
        &self.priority
    }

    /// Prototype of `route`
    #[must_use]
    pub fn prototype(&self, route: Route) -> Option<&[f32]> {
        self.prototypes
            .iter()
            .find(|(r, _)| *r == route)
            .map(|(_, v)| v.as_slice())
    }

    /// Similarity of `vector` to every prototype, in tie-break order
    pub fn scores(&self, vector: &[f32]) -> Result<Vec<(Route, f64)>> {
        if vector.len() != self.dimensions {
            return Err(Error::Embedding(format!(
                "query has {} dimensions, prototypes have {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(self
            .priority
            .iter()
            .filter_map(|route| {
                self.prototype(*route)
                    .map(|p| (*route, f64::from(cosine_similarity(vector, p))))
            })
            .collect())
    }

    /// Most similar route; on equal scores the higher-priority route wins
    pub fn nearest(&self, vector: &[f32]) -> Result<(Route, f64)> {
        let mut best: Option<(Route, f64)> = None;
        for (route, score) in self.scores(vector)? {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((route, score)),
            }
        }
        best.ok_or_else(|| Error::Internal("prototype cache is empty".to_string()))
    }
}

fn centroid(route: Route, vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let dimensions = vectors
        .first()
        .map(Vec::len)
        .ok_or_else(|| Error::Configuration(format!("route `{route}` has no phrases")))?;

    let mut sum = vec![0.0f32; dimensions];
    for vector in vectors {
        if vector.len() != dimensions {
            return Err(Error::Embedding(format!(
                "phrase for `{route}` has {} dimensions, expected {dimensions}",
                vector.len()
            )));
        }
        let mut unit = vector.clone();
        normalize(&mut unit);
        for (acc, x) in sum.iter_mut().zip(&unit) {
            *acc += x;
        }
    }

    if sum.iter().all(|x| *x == 0.0) {
        return Err(Error::Embedding(format!(
            "prototype `{route}` is a zero vector"
        )));
    }
    normalize(&mut sum);
    Ok(sum)
}
