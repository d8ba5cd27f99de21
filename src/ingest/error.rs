use thiserror::Error;

/// Capture failures the shell reacts to.
///
/// Everything else (decode errors, model errors) travels as a plain
/// `anyhow::Error`.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not access capture device {device}: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("failed to capture frame from {device}: {reason}")]
    FrameRead { device: String, reason: String },
}

impl CaptureError {
    pub fn device_unavailable(device: &str, reason: impl std::fmt::Display) -> Self {
        Self::DeviceUnavailable {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn frame_read(device: &str, reason: impl std::fmt::Display) -> Self {
        Self::FrameRead {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Find a `CaptureError` anywhere in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&CaptureError> {
        err.chain().find_map(|cause| cause.downcast_ref::<CaptureError>())
    }

    pub fn is_device_unavailable(err: &anyhow::Error) -> bool {
        matches!(Self::find(err), Some(CaptureError::DeviceUnavailable { .. }))
    }
}
