//! JSON-encoded metadata entries (feature = `"json"`).
//!
//! Metadata is a string→string map so it can travel over transports that
//! only carry headers. Structured values are stored as JSON text.

use super::Context;
use crate::ContextError;
use serde::de::DeserializeOwned;
use serde::Serialize;

impl Context {
    /// Serialize `value` to JSON and store it as metadata under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MarshalFailed`] when serialization fails.
    pub fn set_metadata_json<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<&Self, ContextError> {
        let key = key.into();
        let encoded = serde_json::to_string(value).map_err(|e| ContextError::MarshalFailed {
            key: key.clone(),
            detail: e.to_string(),
        })?;
        Ok(self.with_metadata(key, encoded))
    }

    /// Read the metadata entry under `key` and decode it from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::KeyNotFound`] when the entry is missing and
    /// [`ContextError::UnmarshalFailed`] when it does not decode as `T`.
    pub fn metadata_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let raw = self.metadata(key).ok_or_else(|| ContextError::KeyNotFound {
            key: key.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ContextError::UnmarshalFailed {
            key: key.to_string(),
            detail: e.to_string(),
        })
    }

    /// Like [`Context::metadata_json`], returning `default` on any error.
    pub fn metadata_json_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.metadata_json(key).unwrap_or(default)
    }

    /// Like [`Context::metadata_json`], returning `T::default()` on any error.
    pub fn metadata_json_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.metadata_json(key).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Tenant {
        id: u32,
        name: String,
    }

    #[test]
    fn test_json_roundtrip() {
        let ctx = Context::new();
        let tenant = Tenant {
            id: 7,
            name: "acme".into(),
        };
        ctx.set_metadata_json("tenant", &tenant).unwrap();
        assert_eq!(
            ctx.metadata("tenant").as_deref(),
            Some(r#"{"id":7,"name":"acme"}"#)
        );
        assert_eq!(ctx.metadata_json::<Tenant>("tenant").unwrap(), tenant);
    }

    #[test]
    fn test_missing_key() {
        let ctx = Context::new();
        assert!(matches!(
            ctx.metadata_json::<Tenant>("tenant"),
            Err(ContextError::KeyNotFound { .. })
        ));
        assert_eq!(ctx.metadata_json_or_default::<Tenant>("tenant"), Tenant::default());
    }

    #[test]
    fn test_bad_payload() {
        let ctx = Context::new();
        ctx.with_metadata("tenant", "not json");
        assert!(matches!(
            ctx.metadata_json::<Tenant>("tenant"),
            Err(ContextError::UnmarshalFailed { .. })
        ));
        assert_eq!(ctx.metadata_json_or("tenant", 5u8), 5);
    }
}
