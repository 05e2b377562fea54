use thiserror::Error;

/// Failure to turn one payload into frames. Fatal to that single read only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload too short for {schema}: need {needed} bytes, got {got}")]
    TooShort {
        schema: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("output id `{template}` references unknown field `{field}`")]
    UnknownTemplateField {
        template: &'static str,
        field: String,
    },

    #[error("unknown frame type 0x{discriminator} on {endpoint}")]
    UnknownFrameType {
        endpoint: &'static str,
        discriminator: String,
    },

    #[error("cannot merge non-integer value into field `{0}`")]
    NonIntegerMerge(&'static str),
}

/// Connection-level failures that drive a device session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    #[error("giving up on {address} after {attempts} failed attempts")]
    ExhaustedRetries { address: String, attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::TooShort {
            schema: "sec",
            needed: 4,
            got: 2,
        };
        assert_eq!(err.to_string(), "payload too short for sec: need 4 bytes, got 2");

        let err = FrameError::UnknownFrameType {
            endpoint: "live",
            discriminator: "0707".to_string(),
        };
        assert_eq!(err.to_string(), "unknown frame type 0x0707 on live");
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::ExhaustedRetries {
            address: "AA:BB".to_string(),
            attempts: 5,
        };
        assert_eq!(err.to_string(), "giving up on AA:BB after 5 failed attempts");
    }
}
