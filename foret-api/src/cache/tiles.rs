//! Cache de tuiles à deux niveaux avec single-flight
//!
//! Niveau mémoire (LRU, optionnel) puis Redis. Une valeur vide est une
//! entrée négative valide : « pas de feature pour cette coordonnée ». Les
//! écritures Redis partent sur une tâche détachée pour ne jamais bloquer la
//! réponse ; une écriture perdue se recalcule à la requête suivante.
//!
//! Single-flight : pour une empreinte donnée, au plus un `fetch` est en vol.
//! Les autres arrivées reçoivent la publication du leader via un canal
//! `watch` ; si le leader échoue ou est annulé, elles retentent.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::Pool;
use lru::LruCache;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Publication d'un vol : `None` tant que le leader calcule, puis
/// `Some(Some(bytes))` en cas de succès ou `Some(None)` en cas d'échec.
type FlightValue = Option<Option<Bytes>>;

/// Entrée du niveau mémoire
struct MemoryEntry {
    bytes: Bytes,
    expires_at: Instant,
}

/// Rôle pris par une requête pour une empreinte donnée
enum Role {
    Leader(watch::Sender<FlightValue>),
    Follower(watch::Receiver<FlightValue>),
}

/// Cache de tuiles partagé par toutes les requêtes
pub struct TileCache {
    redis: Option<Pool>,
    memory: Option<Mutex<LruCache<String, MemoryEntry>>>,
    pending: Mutex<HashMap<String, watch::Receiver<FlightValue>>>,
}

/// Retire l'entrée pending du leader, y compris quand sa requête est
/// annulée en plein vol : les suiveurs voient le canal fermé et retentent.
struct FlightGuard<'a> {
    cache: &'a TileCache,
    fingerprint: &'a str,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.cache
            .pending
            .lock()
            .expect("poisoned pending lock")
            .remove(self.fingerprint);
    }
}

impl TileCache {
    /// Crée le cache. `memory_capacity = 0` désactive le niveau mémoire.
    pub fn new(redis: Option<Pool>, memory_capacity: usize) -> Self {
        let memory = NonZeroUsize::new(memory_capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            redis,
            memory,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Sert une tuile : cache, sinon `fetch` puis publication.
    ///
    /// Le résultat peut être vide (entrée négative). Les lecteurs concurrents
    /// d'une même empreinte n'exécutent `fetch` qu'une seule fois.
    pub async fn serve<F, Fut>(
        &self,
        fingerprint: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Bytes, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>, ApiError>>,
    {
        // FnOnce dans une boucle : seul le chemin leader le consomme, et le
        // chemin leader retourne toujours
        let mut fetch = Some(fetch);

        loop {
            if let Some(hit) = self.lookup(fingerprint).await {
                return Ok(hit);
            }

            let role = {
                let mut pending = self.pending.lock().expect("poisoned pending lock");
                match pending.entry(fingerprint.to_string()) {
                    Entry::Occupied(e) => Role::Follower(e.get().clone()),
                    Entry::Vacant(v) => {
                        let (tx, rx) = watch::channel(None);
                        v.insert(rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let guard = FlightGuard {
                        cache: self,
                        fingerprint,
                    };
                    let fetch = match fetch.take() {
                        Some(f) => f,
                        None => return Err(ApiError::upstream("tile fetch already consumed")),
                    };

                    return match fetch().await {
                        Ok(raw) => {
                            let bytes = Bytes::from(raw);
                            self.store(fingerprint, bytes.clone(), ttl);
                            drop(guard);
                            let _ = tx.send(Some(Some(bytes.clone())));
                            Ok(bytes)
                        }
                        Err(e) => {
                            drop(guard);
                            let _ = tx.send(Some(None));
                            Err(e)
                        }
                    };
                }
                Role::Follower(mut rx) => loop {
                    let published = rx.borrow_and_update().clone();
                    match published {
                        Some(Some(bytes)) => return Ok(bytes),
                        // Échec du leader : l'entrée pending est retirée,
                        // on retente depuis le cache
                        Some(None) => break,
                        None => {
                            if rx.changed().await.is_err() {
                                // Leader annulé sans publication
                                break;
                            }
                        }
                    }
                },
            }
        }
    }

    /// Recherche dans les deux niveaux. Erreur Redis = miss.
    async fn lookup(&self, fingerprint: &str) -> Option<Bytes> {
        if let Some(memory) = &self.memory {
            let mut cache = memory.lock().expect("poisoned memory lock");
            if let Some(entry) = cache.get(fingerprint) {
                if entry.expires_at > Instant::now() {
                    return Some(entry.bytes.clone());
                }
                cache.pop(fingerprint);
            }
        }

        let pool = self.redis.as_ref()?;
        let mut conn = match pool.get().await {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "redis unavailable, treating as cache miss");
                return None;
            }
        };
        match conn.get::<_, Option<Vec<u8>>>(fingerprint).await {
            Ok(Some(value)) => Some(Bytes::from(value)),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, fingerprint, "redis read failed, treating as cache miss");
                None
            }
        }
    }

    /// Publie dans le niveau mémoire puis, en tâche détachée, dans Redis.
    fn store(&self, fingerprint: &str, bytes: Bytes, ttl: Duration) {
        if let Some(memory) = &self.memory {
            memory.lock().expect("poisoned memory lock").put(
                fingerprint.to_string(),
                MemoryEntry {
                    bytes: bytes.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }

        if let Some(pool) = self.redis.clone() {
            let key = fingerprint.to_string();
            tokio::spawn(async move {
                let mut conn = match pool.get().await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, key, "redis unavailable, tile not cached");
                        return;
                    }
                };
                if let Err(e) = conn
                    .set_ex::<_, _, ()>(&key, &bytes[..], ttl.as_secs())
                    .await
                {
                    warn!(error = %e, key, "redis write failed, tile not cached");
                }
            });
        }
    }
}
