//! Read-only client for the alquran.cloud surah API.

mod routes;

pub use routes::router;

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::model::{ReadingSession, UnitId};
use crate::social::goals::UNIT_COUNT;
use crate::social::{SessionOutcome, UserSession};
use crate::{Error, Result};

const AYAHS_PER_PAGE: u32 = 15;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surah {
    pub number: UnitId,
    pub name: String,
    pub english_name: String,
    pub english_name_translation: String,
    pub number_of_ayahs: u32,
    pub revelation_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ayah {
    pub number: u32,
    pub text: String,
    pub number_in_surah: u32,
    pub juz: u32,
    pub page: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurahText {
    #[serde(flatten)]
    pub surah: Surah,
    pub ayahs: Vec<Ayah>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Rough mushaf page count of a surah.
pub fn estimated_pages(ayahs: u32) -> u32 {
    ayahs.div_ceil(AYAHS_PER_PAGE)
}

/// Surah content never changes upstream, so every response is kept for the process lifetime.
#[derive(Clone)]
pub struct ScriptureClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base: String,
    index: RwLock<Option<Arc<Vec<Surah>>>>,
    units: RwLock<HashMap<UnitId, Arc<SurahText>>>,
}

impl ScriptureClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base: base.into().trim_end_matches('/').to_owned(),
                index: RwLock::new(None),
                units: RwLock::new(HashMap::new()),
            }),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.inner.base);
        debug!(%url, "fetching scripture");
        let envelope: Envelope<T> = self
            .inner
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.data)
    }

    /// All 114 surahs.
    pub async fn surahs(&self) -> Result<Arc<Vec<Surah>>> {
        if let Some(index) = self.inner.index.read().await.as_ref() {
            return Ok(index.clone());
        }
        let index = Arc::new(self.fetch::<Vec<Surah>>("/surah").await?);
        *self.inner.index.write().await = Some(index.clone());
        Ok(index)
    }

    #[instrument(skip(self))]
    pub async fn surah(&self, number: UnitId) -> Result<Arc<SurahText>> {
        if !(1..=UNIT_COUNT).contains(&number) {
            return Err(Error::not_found(format!("surah {number}")));
        }
        if let Some(text) = self.inner.units.read().await.get(&number) {
            return Ok(text.clone());
        }
        let text = Arc::new(self.fetch::<SurahText>(&format!("/surah/{number}")).await?);
        self.inner.units.write().await.insert(number, text.clone());
        Ok(text)
    }

    /// Records a whole surah as one reading session.
    pub async fn finish_unit(&self, session: &UserSession, number: UnitId) -> Result<SessionOutcome> {
        let text = self.surah(number).await?;
        let surah = &text.surah;
        let ayahs = surah.number_of_ayahs;
        session
            .record_session(ReadingSession::unit(
                estimated_pages(ayahs),
                surah.number,
                surah.english_name.as_str(),
                ayahs,
            ))
            .await
    }
}
