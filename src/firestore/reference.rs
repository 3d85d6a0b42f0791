use super::models::{ArrayValue, Document, ListDocumentsResponse, MapValue, Value, ValueType};
use super::{DocumentData, FirestoreError};
use crate::core::{describe_error, parse_error_response, GoogleErrorResponse};
use reqwest::{header, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::de::{DeserializeOwned, Error as _};
use serde::Serialize;
use serde_json::Value as SerdeValue;
use std::collections::HashMap;
use url::Url;

fn conversion_error(message: String) -> FirestoreError {
    FirestoreError::SerializationError(serde_json::Error::custom(message))
}

/// Typed field map from the wire -> plain document data.
fn fields_to_data(fields: HashMap<String, Value>) -> Result<DocumentData, FirestoreError> {
    fields
        .into_iter()
        .map(|(key, value)| value_to_json(value).map(|value| (key, value)))
        .collect()
}

fn value_to_json(value: Value) -> Result<SerdeValue, FirestoreError> {
    Ok(match value.value_type {
        ValueType::StringValue(s) => SerdeValue::String(s),
        ValueType::IntegerValue(s) => {
            let i: i64 = s
                .parse()
                .map_err(|e| conversion_error(format!("bad integerValue '{}': {}", s, e)))?;
            SerdeValue::from(i)
        }
        ValueType::DoubleValue(d) => serde_json::Number::from_f64(d)
            .map(SerdeValue::Number)
            .ok_or_else(|| conversion_error(format!("bad doubleValue {}", d)))?,
        ValueType::BooleanValue(b) => SerdeValue::Bool(b),
        ValueType::MapValue(map_value) => SerdeValue::Object(fields_to_data(map_value.fields)?),
        ValueType::ArrayValue(array_value) => SerdeValue::Array(
            array_value
                .values
                .into_iter()
                .map(value_to_json)
                .collect::<Result<_, _>>()?,
        ),
        ValueType::NullValue(_) => SerdeValue::Null,
        ValueType::GeoPointValue(gp) => {
            serde_json::json!({ "latitude": gp.latitude, "longitude": gp.longitude })
        }
        ValueType::TimestampValue(s) | ValueType::BytesValue(s) | ValueType::ReferenceValue(s) => {
            SerdeValue::String(s)
        }
    })
}

/// Serializes `value` and converts it to the typed field map Firestore expects.
/// Only values that serialize to a JSON object can be documents.
fn typed_fields<T: Serialize>(value: &T) -> Result<HashMap<String, Value>, FirestoreError> {
    let SerdeValue::Object(map) = serde_json::to_value(value)? else {
        return Err(conversion_error(
            "only objects can be stored as documents".to_string(),
        ));
    };
    map.into_iter()
        .map(|(key, value)| json_to_value(value).map(|value| (key, value)))
        .collect()
}

fn json_to_value(value: SerdeValue) -> Result<Value, FirestoreError> {
    let value_type = match value {
        SerdeValue::Null => ValueType::NullValue(()),
        SerdeValue::Bool(b) => ValueType::BooleanValue(b),
        SerdeValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => ValueType::IntegerValue(i.to_string()),
            (None, Some(f)) => ValueType::DoubleValue(f),
            (None, None) => return Err(conversion_error(format!("unsupported number {}", n))),
        },
        SerdeValue::String(s) => ValueType::StringValue(s),
        SerdeValue::Array(a) => ValueType::ArrayValue(ArrayValue {
            values: a.into_iter().map(json_to_value).collect::<Result<_, _>>()?,
        }),
        SerdeValue::Object(o) => ValueType::MapValue(MapValue {
            fields: o
                .into_iter()
                .map(|(key, value)| json_to_value(value).map(|value| (key, value)))
                .collect::<Result<_, _>>()?,
        }),
    };
    Ok(Value { value_type })
}

/// A 404 only means "no such document" when the body says `NOT_FOUND`.
/// Anything else (a proxy page, an unknown project or database) is an error.
fn is_missing_document(body: &str) -> bool {
    serde_json::from_str::<GoogleErrorResponse>(body)
        .is_ok_and(|resp| resp.error.status.as_deref() == Some("NOT_FOUND"))
}

/// Splits a slash-separated path and rejects empty segments.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, FirestoreError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(FirestoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Checks that `path` names a document (an even number of segments).
pub(crate) fn validate_document_path(path: &str) -> Result<(), FirestoreError> {
    if split_path(path)?.len() % 2 != 0 {
        return Err(FirestoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Checks that `path` names a collection (an odd number of segments).
pub(crate) fn validate_collection_path(path: &str) -> Result<(), FirestoreError> {
    if split_path(path)?.len() % 2 != 1 {
        return Err(FirestoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct DocumentReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) path: String,
}

impl<'a> DocumentReference<'a> {
    /// The document's ID (last path segment).
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub async fn get<T: DeserializeOwned>(&self) -> Result<Option<T>, FirestoreError> {
        let response = self.client.get(&self.path).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            if is_missing_document(&body) {
                return Ok(None);
            }
            return Err(FirestoreError::ApiError(describe_error(
                StatusCode::NOT_FOUND,
                &body,
                "Get document failed",
            )));
        }

        if !response.status().is_success() {
            return Err(FirestoreError::ApiError(
                parse_error_response(response, "Get document failed").await,
            ));
        }

        let doc: Document = response.json().await?;
        let data = fields_to_data(doc.fields)?;
        Ok(Some(serde_json::from_value(SerdeValue::Object(data))?))
    }

    /// Overwrites the document, creating it if needed.
    pub async fn set<T: Serialize>(&self, value: &T) -> Result<(), FirestoreError> {
        self.patch(value, &[], "Set document failed").await
    }

    /// Writes only the fields named in `update_mask`, or every field in `value` when `None`.
    pub async fn update<T: Serialize>(
        &self,
        value: &T,
        update_mask: Option<Vec<String>>,
    ) -> Result<(), FirestoreError> {
        let mask = update_mask.unwrap_or_default();
        self.patch(value, &mask, "Update document failed").await
    }

    async fn patch<T: Serialize>(
        &self,
        value: &T,
        update_mask: &[String],
        context: &str,
    ) -> Result<(), FirestoreError> {
        let fields = typed_fields(value)?;

        let mut url =
            Url::parse(&self.path).map_err(|_| FirestoreError::InvalidPath(self.path.clone()))?;
        if !update_mask.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for field in update_mask {
                pairs.append_pair("updateMask.fieldPaths", field);
            }
        }

        let body = serde_json::to_vec(&serde_json::json!({ "fields": fields }))?;

        let response = self
            .client
            .patch(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FirestoreError::ApiError(
                parse_error_response(response, context).await,
            ));
        }

        Ok(())
    }

    pub async fn delete(&self) -> Result<(), FirestoreError> {
        let response = self.client.delete(&self.path).send().await?;

        if !response.status().is_success() {
            return Err(FirestoreError::ApiError(
                parse_error_response(response, "Delete document failed").await,
            ));
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct CollectionReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) path: String,
}

impl<'a> CollectionReference<'a> {
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn doc(&self, document_id: &str) -> DocumentReference<'a> {
        DocumentReference {
            client: self.client,
            path: format!("{}/{}", self.path, document_id),
        }
    }

    /// Lists every document in the collection, following page tokens.
    pub async fn list_documents(&self) -> Result<Vec<Document>, FirestoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = Url::parse(&self.path)
                .map_err(|_| FirestoreError::InvalidPath(self.path.clone()))?;
            if let Some(token) = page_token.take() {
                url.query_pairs_mut().append_pair("pageToken", &token);
            }

            let response = self.client.get(url).send().await?;

            if !response.status().is_success() {
                return Err(FirestoreError::ApiError(
                    parse_error_response(response, "List documents failed").await,
                ));
            }

            let page: ListDocumentsResponse = response.json().await?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }

    /// Creates a document with a server-assigned ID.
    pub async fn add<T: Serialize>(&self, value: &T) -> Result<Document, FirestoreError> {
        let fields = typed_fields(value)?;
        let body = serde_json::to_vec(&serde_json::json!({ "fields": fields }))?;

        let response = self
            .client
            .post(&self.path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FirestoreError::ApiError(
                parse_error_response(response, "Add document failed").await,
            ));
        }

        let doc: Document = response.json().await?;
        Ok(doc)
    }
}
