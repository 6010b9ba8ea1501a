use kata_protocol::{ErrorCode, ErrorEnvelope};

use crate::transport::ClientError;

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// User-facing notification text for a failed call.
pub fn toast_message(err: &ClientError) -> String {
    match err {
        ClientError::Rpc(envelope) => toast_for_envelope(envelope),
        ClientError::Transport(_) => "Could not reach the server. Check your connection.".to_string(),
        ClientError::NotAMutation { .. } => GENERIC_FAILURE.to_string(),
    }
}

pub fn toast_for_envelope(envelope: &ErrorEnvelope) -> String {
    let text = match envelope.code {
        ErrorCode::Unauthorized => "Please sign in to continue.",
        ErrorCode::Forbidden => "You don't have permission to do that.",
        ErrorCode::Banned => "Your account has been banned. Contact support if you think this is a mistake.",
        ErrorCode::NotFound => "We couldn't find what you were looking for.",
        // Validation and business-rule messages are written for users.
        ErrorCode::BadRequest => return envelope.message.clone(),
        ErrorCode::InternalServerError | ErrorCode::Unknown => GENERIC_FAILURE,
    };
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[test]
    fn known_codes_get_specific_text() {
        let banned = ErrorEnvelope::new(ErrorCode::Banned, "This account has been banned");
        assert!(toast_for_envelope(&banned).starts_with("Your account has been banned"));

        let duplicate = ErrorEnvelope::new(ErrorCode::BadRequest, "An exercise with slug joins already exists");
        assert_eq!(toast_for_envelope(&duplicate), "An exercise with slug joins already exists");
    }

    #[test]
    fn unknown_and_internal_codes_fall_back() {
        let unknown = ErrorEnvelope::new(ErrorCode::Unknown, "TEAPOT");
        assert_eq!(toast_for_envelope(&unknown), GENERIC_FAILURE);
        let internal = ClientError::Rpc(ErrorEnvelope::new(ErrorCode::InternalServerError, "x"));
        assert_eq!(toast_message(&internal), GENERIC_FAILURE);
        let offline = ClientError::Transport(TransportError::Other("connection reset".to_string()));
        assert!(toast_message(&offline).contains("reach the server"));
    }
}
