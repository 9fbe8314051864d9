#[macro_export]
macro_rules! impl_error_from {
    ($thing:ty, $from_thing:ty, $field:ident) => {
        impl From<$from_thing> for $thing {
            fn from(e: $from_thing) -> Self {
                <$thing>::$field(e)
            }
        }
    };
}

#[macro_export]
/// Validates a sha256d hash literal at compile time. Requires `FromStr` and
/// `sha256d` in scope.
macro_rules! dhash {
    ($s:expr) => {{
        // Catch invalid literals at compile time
        const _: () = match $crate::macros::validate_hash_compile_time($s) {
            Ok(()) => (),
            Err(e) => panic!("{}", e),
        };
        sha256d::Hash::from_str($s).expect("Literal should be valid")
    }};
}

#[doc(hidden)]
// This const function is used to validate hash literals at compile time
pub const fn validate_hash_compile_time(s: &str) -> Result<(), &str> {
    let bytes = s.as_bytes();

    // Note: An ASCII character is 1 byte, so the expected byte count is 64
    if bytes.len() != 64 {
        return Err("Hash literal is not exactly 64 hex digits");
    }

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !((b >= b'0' && b <= b'9') || (b >= b'a' && b <= b'f') || (b >= b'A' && b <= b'F')) {
            return Err("Hash literal contains an invalid ASCII hex digit");
        }
        i += 1;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::validate_hash_compile_time as validate_hash;

    #[test]
    fn test_validate_hash_compile_time() {
        let valid = "f3e94742aca4b5ef85488dc37c06c3282295ffec960994b2c0d5ac2a25a95766";
        assert!(validate_hash(valid).is_ok());

        // Wrong lengths
        assert!(validate_hash("").is_err());
        assert!(validate_hash(&"a".repeat(63)).is_err());
        assert!(validate_hash(&"a".repeat(65)).is_err());
        assert!(validate_hash(&"a".repeat(64)).is_ok());

        // Invalid hex character at the end: 'g'
        let invalid = "f3e94742aca4b5ef85488dc37c06c3282295ffec960994b2c0d5ac2a25a9576g";
        assert_eq!(invalid.len(), 64);
        assert!(validate_hash(invalid).is_err());
    }
}
