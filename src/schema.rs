use apache_avro::{from_avro_datum, from_value, to_avro_datum, to_value, Schema};
use serde::Deserialize;

use crate::error::UnhandledError;
use crate::types::PaymentProcessed;

/// The subject the inbound event schema is registered under.
pub const SCHEMA_NAME: &str = "payment-processed";

#[derive(Deserialize)]
struct RegistryResponse {
    schema: String,
}

/// Fetch an Avro schema definition from the registry. The registry serves
/// the latest version of a subject as JSON with the definition embedded in
/// the `schema` field.
pub async fn fetch_schema(registry_url: &str, name: &str) -> Result<String, UnhandledError> {
    let url = format!(
        "{}/subjects/{}/versions/latest",
        registry_url.trim_end_matches('/'),
        name
    );
    let response = reqwest::get(&url).await?.error_for_status()?;
    let body: RegistryResponse = response.json().await?;
    Ok(body.schema)
}

/// Binary Avro codec for `payment-processed` events, bound to the schema the
/// registry served at startup. Republished events are re-encoded with the
/// same schema, so the attempt counter survives the round trip.
pub struct EventCodec {
    schema: Schema,
}

impl EventCodec {
    pub fn new(definition: &str) -> Result<Self, apache_avro::Error> {
        let schema = Schema::parse_str(definition)?;
        Ok(Self { schema })
    }

    pub fn decode(&self, payload: &[u8]) -> Result<PaymentProcessed, apache_avro::Error> {
        let mut reader = payload;
        let value = from_avro_datum(&self.schema, &mut reader, None)?;
        from_value::<PaymentProcessed>(&value)
    }

    pub fn encode(&self, event: &PaymentProcessed) -> Result<Vec<u8>, apache_avro::Error> {
        let value = to_value(event)?;
        to_avro_datum(&self.schema, value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DEFINITION: &str = r#"
    {
        "type": "record",
        "name": "payment_processed",
        "fields": [
            {"name": "payment_resource_id", "type": "string"},
            {"name": "refund_id", "type": ["null", "string"], "default": null},
            {"name": "attempt", "type": "int", "default": 0}
        ]
    }"#;

    #[test]
    fn payment_events_round_trip() {
        let codec = EventCodec::new(DEFINITION).unwrap();
        let event = PaymentProcessed {
            payment_resource_id: "P1".to_string(),
            refund_id: None,
            attempt: 0,
        };

        let decoded = codec.decode(&codec.encode(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn refund_events_round_trip() {
        let codec = EventCodec::new(DEFINITION).unwrap();
        let event = PaymentProcessed {
            payment_resource_id: "P4".to_string(),
            refund_id: Some("R1".to_string()),
            attempt: 3,
        };

        let decoded = codec.decode(&codec.encode(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn garbage_payloads_do_not_decode() {
        let codec = EventCodec::new(DEFINITION).unwrap();
        assert!(codec.decode(&[0xff, 0x00, 0x01]).is_err());
    }

    #[test]
    fn registry_response_exposes_the_definition() {
        let body: RegistryResponse =
            serde_json::from_str(r#"{"subject": "payment-processed", "version": 3, "id": 17, "schema": "{\"type\": \"string\"}"}"#)
                .unwrap();
        assert_eq!(body.schema, "{\"type\": \"string\"}");
    }
}
