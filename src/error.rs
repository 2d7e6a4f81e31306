use std::{error, fmt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    Bluez,
    AdapterNotFound,
    Registration,
    Unregistration,
    Subscription,
    Policy,
    Config,
}

impl From<ErrorType> for &'static str {
    fn from(error_type: ErrorType) -> &'static str {
        match error_type {
            ErrorType::Bluez => "Bluez",
            ErrorType::AdapterNotFound => "AdapterNotFound",
            ErrorType::Registration => "Registration",
            ErrorType::Unregistration => "Unregistration",
            ErrorType::Subscription => "Subscription",
            ErrorType::Policy => "Policy",
            ErrorType::Config => "Config",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_type: &str = self.clone().into();
        write!(f, "<Bluenet {} Error>", error_type)
    }
}

impl error::Error for ErrorType {}

#[derive(Debug, Clone)]
pub struct Error {
    name: String,
    description: String,
    error_type: ErrorType,
}

impl Error {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, description: D, error_type: ErrorType) -> Self {
        Error {
            name: name.into(),
            description: description.into(),
            error_type,
        }
    }

    /// Re-labels a bus failure with the lifecycle step it happened in,
    /// keeping the bus error name and message.
    pub fn with_type(self, error_type: ErrorType) -> Self {
        Error { error_type, ..self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn error_type(&self) -> &ErrorType {
        &self.error_type
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_type: &str = self.error_type.clone().into();
        write!(
            f,
            "**Bluenet {} Error** {}: {}",
            error_type, self.name, self.description,
        )
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error_type)
    }
}
