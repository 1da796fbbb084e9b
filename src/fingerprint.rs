//! Content-addressed keys for dimension rows.
//!
//! A [`Fingerprint`] is the MD5 digest of a schema's canonical tokens joined
//! with `|`. Dimension tables and fact foreign keys are both derived through
//! the single [`FingerprintFunction`] per schema held in a [`KeyCatalog`]; no
//! other code path may compute keys.

use std::{fmt, str::FromStr, sync::Arc};

use anyhow::{Result, anyhow, bail};
use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    error::WarehouseError,
    normalize::normalize,
    record::{RawRecord, RecordLayout},
    schema::{Dimension, DimensionSchema, key_signature},
};

pub const KEY_SEPARATOR: char = '|';

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn of(material: &str) -> Self {
        let digest = Md5::digest(material.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl FromStr for Fingerprint {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let hex = value.trim();
        if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("Fingerprint '{value}' must be 32 hexadecimal characters");
        }
        let mut bytes = [0u8; 16];
        for (idx, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16)
                .map_err(|err| anyhow!("Fingerprint '{value}': {err}"))?;
        }
        Ok(Fingerprint(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Key derivation for one dimension schema.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintFunction {
    schema: &'static DimensionSchema,
}

impl FingerprintFunction {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            schema: dimension.schema(),
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.schema.dimension
    }

    pub fn schema(&self) -> &'static DimensionSchema {
        self.schema
    }

    /// The exact text that gets digested. Fields absent from the record count
    /// as null; callers that need structural checks use [`Self::ensure_layout`].
    pub fn key_material(&self, record: &RawRecord) -> String {
        let mut material = String::with_capacity(self.schema.fields.len() * 12);
        for (idx, field) in self.schema.fields.iter().enumerate() {
            if idx > 0 {
                material.push(KEY_SEPARATOR);
            }
            let raw = field.source.raw_value(record);
            material.push_str(&normalize(raw.as_deref()));
        }
        material
    }

    /// Must be fed raw values; recoding before this call changes the key.
    pub fn fingerprint(&self, record: &RawRecord) -> Fingerprint {
        Fingerprint::of(&self.key_material(record))
    }

    pub fn ensure_layout(&self, layout: &RecordLayout, source_id: &str) -> Result<(), WarehouseError> {
        match self
            .schema
            .source_columns()
            .into_iter()
            .find(|column| !layout.contains(column))
        {
            Some(column) => Err(WarehouseError::SchemaMismatch {
                dimension: self.dimension(),
                column: column.to_string(),
                source_id: source_id.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// The eight fingerprint functions, shared by every derivation site.
#[derive(Debug)]
pub struct KeyCatalog {
    functions: [FingerprintFunction; 8],
    signature: String,
}

impl KeyCatalog {
    pub fn standard() -> Arc<Self> {
        Arc::new(Self {
            functions: Dimension::ALL.map(FingerprintFunction::new),
            signature: key_signature(),
        })
    }

    pub fn function(&self, dimension: Dimension) -> &FingerprintFunction {
        &self.functions[dimension.ordinal()]
    }

    pub fn functions(&self) -> &[FingerprintFunction; 8] {
        &self.functions
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn fingerprint_all(&self, record: &RawRecord) -> [Fingerprint; 8] {
        self.functions.map(|function| function.fingerprint(record))
    }

    pub fn ensure_layout(&self, layout: &RecordLayout, source_id: &str) -> Result<(), WarehouseError> {
        self.functions
            .iter()
            .try_for_each(|function| function.ensure_layout(layout, source_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lowercase_hex_and_parses_back() {
        let fp = Fingerprint::of("NULL");
        assert_eq!(fp.to_string(), "6c3e226b4d4795d518ab341b0824ec29");
        assert_eq!(fp.to_string().parse::<Fingerprint>().unwrap(), fp);
        assert_eq!(
            "6C3E226B4D4795D518AB341B0824EC29".parse::<Fingerprint>().unwrap(),
            fp
        );
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!("abc".parse::<Fingerprint>().is_err());
        assert!("zz3e226b4d4795d518ab341b0824ec29".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn occupation_key_material_is_the_single_token() {
        let record = RawRecord::from_pairs([("ocupacao", Some(" Pedreiro "))]);
        let function = FingerprintFunction::new(Dimension::Occupation);
        assert_eq!(function.key_material(&record), "Pedreiro");
    }

    #[test]
    fn missing_columns_are_null_for_the_function_but_fail_layout_checks() {
        let record = RawRecord::from_pairs([("sexo", Some("Masculino"))]);
        let function = FingerprintFunction::new(Dimension::Patient);
        assert_eq!(function.key_material(&record), "Masculino|NULL|NULL|NULL|NULL");
        let err = function
            .ensure_layout(record.layout(), "rhc2019.csv")
            .unwrap_err();
        assert!(matches!(
            err,
            WarehouseError::SchemaMismatch { ref column, .. } if column == "idade"
        ));
    }

    #[test]
    fn serde_uses_hex_strings() {
        let fp = Fingerprint::of("NULL|NULL|NULL");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"85a57d9c33283d4a015e1051db2e9e23\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
