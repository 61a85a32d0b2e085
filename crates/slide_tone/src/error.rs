use std::borrow::Cow;

/// Everything that can go wrong while producing a tone.
///
/// Device failures carry the backend's own error text, so that the message shown to the user is whatever the platform
/// said.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't open device: {message}")]
    DeviceOpen {
        device: String,
        message: Cow<'static, str>,
    },

    #[error("couldn't set params: {message}")]
    Configure { message: Cow<'static, str> },

    #[error("couldn't write audio: {message}")]
    Write { message: Cow<'static, str> },

    #[error("The session must be configured before audio can be written to it")]
    NotConfigured,

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: Cow<'static, str> },

    #[error("Unable to read configuration file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Unable to parse configuration file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn device_open<T>(device: &str, message: T) -> Error
    where
        Cow<'static, str>: From<T>,
    {
        Error::DeviceOpen {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn configure<T>(message: T) -> Error
    where
        Cow<'static, str>: From<T>,
    {
        Error::Configure {
            message: message.into(),
        }
    }

    pub(crate) fn write<T>(message: T) -> Error
    where
        Cow<'static, str>: From<T>,
    {
        Error::Write {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config<T>(message: T) -> Error
    where
        Cow<'static, str>: From<T>,
    {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Did this error come from opening the device?
    pub fn is_device_open(&self) -> bool {
        matches!(self, Error::DeviceOpen { .. })
    }

    /// Did this error come from configuring an already-open device?
    pub fn is_configure(&self) -> bool {
        matches!(self, Error::Configure { .. })
    }
}
