//! Register names inside `varfile_mt1_config1`.

/// Measured room temperature (°C).
pub const ROOM_TEMPERATURE: &str = "A_211";

/// Requested room temperature (°C), writable.
pub const ROOM_TEMPERATURE_REQUESTED: &str = "A_191";

/// Operating mode code.
pub const OPERATING_MODE: &str = "I_51";

/// Name of an operating mode code.
///
/// Unknown codes are returned unchanged.
pub fn operating_mode_name(code: &str) -> &str {
    match code.trim() {
        "0" => "auto",
        "1" => "heating",
        "2" => "cooling",
        _ => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_modes() {
        assert_eq!(operating_mode_name("0"), "auto");
        assert_eq!(operating_mode_name("1"), "heating");
        assert_eq!(operating_mode_name("2"), "cooling");
    }

    #[test]
    fn test_unknown_mode_passes_through() {
        assert_eq!(operating_mode_name("7"), "7");
    }
}
