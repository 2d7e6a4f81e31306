use crate::{Error, ErrorType};
use dbus::Error as DbusError;

impl From<DbusError> for Error {
    fn from(dbus_error: DbusError) -> Error {
        Error::new(
            dbus_error.name().unwrap_or(""),
            dbus_error.message().unwrap_or(""),
            ErrorType::Bluez,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_bluez_error_name() {
        let error = Error::from(DbusError::new_custom(
            "org.bluez.Error.AlreadyExists",
            "Already Exists",
        ));
        assert_eq!(error.name(), "org.bluez.Error.AlreadyExists");
        assert_eq!(error.description(), "Already Exists");
        assert_eq!(error.error_type(), &ErrorType::Bluez);
    }
}
