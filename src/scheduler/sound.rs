// Sound descriptors and the byte-fetch capability
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::validation::{FieldErrors, ValidationError};

/// Capability that resolves a sound id to its encoded audio bytes
#[async_trait]
pub trait FetchBytes: Send + Sync {
    async fn fetch(&self, id: &str, extra: &Value) -> anyhow::Result<Vec<u8>>;
}

/// Adapts an async closure `(id, extra) -> bytes` into a `FetchBytes`
pub struct FnFetcher<F>(F);

#[async_trait]
impl<F, Fut> FetchBytes for FnFetcher<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send,
{
    async fn fetch(&self, id: &str, extra: &Value) -> anyhow::Result<Vec<u8>> {
        (self.0)(id.to_string(), extra.clone()).await
    }
}

/// Wrap a closure as a shareable fetcher
pub fn fetch_fn<F, Fut>(f: F) -> Arc<dyn FetchBytes>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    Arc::new(FnFetcher(f))
}

/// Caller-supplied reference to a playable sound
#[derive(Clone)]
pub struct SoundDescriptor {
    pub id: String,
    pub fetcher: Option<Arc<dyn FetchBytes>>,
    /// Arbitrary metadata handed back to the fetcher; must be an object when set
    pub extra: Value,
}

impl SoundDescriptor {
    pub fn new(id: impl Into<String>, fetcher: Arc<dyn FetchBytes>) -> Self {
        Self {
            id: id.into(),
            fetcher: Some(fetcher),
            extra: Value::Object(Map::new()),
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    fn field_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.id.is_empty() {
            errors.add("id", "ID must be provided.");
        }
        if self.fetcher.is_none() {
            errors.add("fetcher", "A function to get the sound bytes is required.");
        }
        if !matches!(self.extra, Value::Null | Value::Object(_)) {
            errors.add("extra", "If any extra data is provided, it must be an object.");
        }
        errors
    }
}

impl fmt::Debug for SoundDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundDescriptor")
            .field("id", &self.id)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<fetcher>"))
            .field("extra", &self.extra)
            .finish()
    }
}

/// Validate a whole sound list, reporting every bad descriptor by index.
///
/// Missing `extra` is normalized to an empty object.
pub fn validate_sounds(
    sounds: Vec<SoundDescriptor>,
) -> Result<Vec<SoundDescriptor>, ValidationError> {
    let errors: BTreeMap<usize, FieldErrors> = sounds
        .iter()
        .enumerate()
        .map(|(index, sound)| (index, sound.field_errors()))
        .filter(|(_, errors)| !errors.is_empty())
        .collect();

    if !errors.is_empty() {
        return Err(ValidationError::Sounds(errors));
    }

    Ok(sounds
        .into_iter()
        .map(|mut sound| {
            if sound.extra.is_null() {
                sound.extra = Value::Object(Map::new());
            }
            sound
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes_fetcher() -> Arc<dyn FetchBytes> {
        fetch_fn(|_id, _extra| async { Ok(vec![1, 2, 3]) })
    }

    #[test]
    fn test_valid_list_passes_and_normalizes_extra() {
        let sounds = vec![
            SoundDescriptor::new("a", bytes_fetcher()),
            SoundDescriptor::new("b", bytes_fetcher()).with_extra(Value::Null),
        ];
        let sounds = validate_sounds(sounds).unwrap();
        assert_eq!(sounds[1].extra, json!({}));
    }

    #[test]
    fn test_all_bad_descriptors_are_collected() {
        let sounds = vec![
            SoundDescriptor::new("ok", bytes_fetcher()),
            SoundDescriptor {
                id: String::new(),
                fetcher: None,
                extra: json!({}),
            },
            SoundDescriptor::new("c", bytes_fetcher()).with_extra(json!([1, 2])),
        ];

        let err = validate_sounds(sounds).unwrap_err();
        let messages = err.sound_messages().unwrap();
        assert_eq!(messages.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            messages[&1].fields().collect::<Vec<_>>(),
            vec!["fetcher", "id"]
        );
        assert_eq!(
            messages[&2].get("extra"),
            Some("If any extra data is provided, it must be an object.")
        );
    }

    #[test]
    fn test_only_an_empty_id_is_rejected() {
        let err = validate_sounds(vec![SoundDescriptor::new("", bytes_fetcher())]).unwrap_err();
        assert!(err.sound_messages().unwrap()[&0].contains("id"));

        let sounds = validate_sounds(vec![SoundDescriptor::new("  ", bytes_fetcher())]).unwrap();
        assert_eq!(sounds[0].id, "  ");
    }

    #[tokio::test]
    async fn test_fn_fetcher_receives_id_and_extra() {
        let fetcher = fetch_fn(|id, extra| async move {
            Ok(format!("{}:{}", id, extra["bucket"].as_str().unwrap_or("")).into_bytes())
        });
        let bytes = fetcher.fetch("7", &json!({"bucket": "rain"})).await.unwrap();
        assert_eq!(bytes, b"7:rain".to_vec());
    }
}
