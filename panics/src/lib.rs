use core::any::Any;

use anyhow::Error;

#[must_use]
pub fn payload_into_error(payload: Box<dyn Any + Send + 'static>) -> Error {
    let payload = match payload.downcast::<String>() {
        Ok(string) => return Error::msg(*string),
        Err(other) => other,
    };

    if let Ok(string) = payload.downcast::<&str>() {
        return Error::msg(*string);
    }

    Error::msg("panic with payload of unknown type")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_into_error_keeps_string_messages() {
        let owned = std::panic::catch_unwind(|| panic!("{}", "owned message"))
            .expect_err("closure panics");

        let borrowed = std::panic::catch_unwind(|| std::panic::panic_any("static message"))
            .expect_err("closure panics");

        let unknown =
            std::panic::catch_unwind(|| std::panic::panic_any(0_u8)).expect_err("closure panics");

        assert_eq!(payload_into_error(owned).to_string(), "owned message");
        assert_eq!(payload_into_error(borrowed).to_string(), "static message");
        assert_eq!(
            payload_into_error(unknown).to_string(),
            "panic with payload of unknown type",
        );
    }
}
