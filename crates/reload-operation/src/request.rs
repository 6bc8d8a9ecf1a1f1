use crate::ReloadError;

pub const OPERATION_ID: &str = "Document.HotReloadOperation";
pub const VALIDATE_PARAM: &str = "validate";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadRequest {
    /// Check target-platform compatibility before installing.
    pub validate: bool,
}

impl ReloadRequest {
    pub fn new(validate: bool) -> Self {
        Self { validate }
    }

    /// Builds a request from automation parameters. Only `validate` is known.
    pub fn from_params<'a, I>(params: I) -> Result<Self, ReloadError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut validate = None;
        for (key, value) in params {
            if key != VALIDATE_PARAM {
                return Err(ReloadError::InvalidParameter(format!(
                    "unknown parameter '{key}' for {OPERATION_ID}"
                )));
            }
            if validate.is_some() {
                return Err(ReloadError::InvalidParameter(format!(
                    "parameter '{key}' given more than once"
                )));
            }
            validate = Some(parse_bool(key, value)?);
        }

        Ok(Self {
            validate: validate.unwrap_or(false),
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ReloadError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ReloadError::InvalidParameter(format!(
            "parameter '{key}' expects true or false, got '{value}'"
        ))),
    }
}
