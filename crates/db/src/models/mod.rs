//! Row models. Each converts into its `rex_core` domain type with
//! `TryFrom`, failing only when a stored enum value is unknown.

pub mod barcode;
pub mod claim;
pub mod repair;
pub mod timeline;

use rex_core::error::CoreError;

/// Parse an optional text column into a domain enum.
pub(crate) fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>, CoreError>
where
    T: std::str::FromStr<Err = CoreError>,
{
    value.map(str::parse).transpose()
}
