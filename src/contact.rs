//! A single phone book entry.
//!
//! The photo buffer is owned exclusively by the record: [`Contact::set_photo`]
//! copies its input and [`Contact::photo`] hands out a fresh copy, so no
//! caller can alias or mutate the stored bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    name: String,
    phone: String,
    cell_phone: String,
    #[serde(with = "photo_base64", default)]
    photo: Option<Vec<u8>>,
}

impl Contact {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        cell_phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            cell_phone: cell_phone.into(),
            photo: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn set_phone(&mut self, phone: impl Into<String>) {
        self.phone = phone.into();
    }

    pub fn cell_phone(&self) -> &str {
        &self.cell_phone
    }

    pub fn set_cell_phone(&mut self, cell_phone: impl Into<String>) {
        self.cell_phone = cell_phone.into();
    }

    /// Store a copy of `photo`. `None` or an empty slice clears the photo.
    pub fn set_photo(&mut self, photo: Option<&[u8]>) {
        self.photo = photo.filter(|bytes| !bytes.is_empty()).map(<[u8]>::to_vec);
    }

    pub fn clear_photo(&mut self) {
        self.photo = None;
    }

    /// A fresh copy of the stored photo.
    pub fn photo(&self) -> Option<Vec<u8>> {
        self.photo.clone()
    }

    pub fn has_photo(&self) -> bool {
        self.photo.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }

    pub fn photo_len(&self) -> usize {
        self.photo.as_ref().map_or(0, Vec::len)
    }

    /// Case-insensitive substring match against name, phone and cell phone.
    /// An empty query matches every contact.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        [&self.name, &self.phone, &self.cell_phone]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Phone: {}, Cell: {})",
            self.name, self.phone, self.cell_phone
        )
    }
}

/// Snapshot encoding of the photo: standard base64, `null` when absent.
mod photo_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(photo: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match photo {
            Some(bytes) if !bytes.is_empty() => s.serialize_str(&STANDARD.encode(bytes)),
            _ => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let Some(encoded) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)?;
        Ok((!bytes.is_empty()).then_some(bytes))
    }
}
