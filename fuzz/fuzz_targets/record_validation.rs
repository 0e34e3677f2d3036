#![no_main]

//! Fuzz target for record payload validation.
//!
//! Arbitrary bytes from the broker must either validate into a message with
//! a non-empty endpoint and body, or be rejected with an error. Never a
//! panic.

use libfuzzer_sys::fuzz_target;
use pushbridge_core::{validate, ValidationErrorKind};
use pushbridge_delivery::PublishRequest;

fuzz_target!(|data: &[u8]| {
    match validate(data) {
        Ok(message) => {
            assert!(!message.target_endpoint.is_empty());
            assert!(!message.body.is_empty());

            // The request body must always be valid JSON.
            let payload = PublishRequest::from(&message).message_payload();
            assert!(payload.starts_with('{'));
        },
        Err(error) => {
            if error.kind() == ValidationErrorKind::MissingField {
                assert!(error.field().is_some());
            }
        },
    }
});
