use thiserror::Error;

use crate::catalog::CatalogError;
use crate::identity::IdentityError;
use crate::pricing::PricingError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<PricingError> for OrderError {
    fn from(value: PricingError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<CatalogError> for OrderError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::NotFound(_) => Self::NotFound(value.to_string()),
            CatalogError::Unavailable { .. } => Self::UpstreamUnavailable(value.to_string()),
        }
    }
}

impl From<IdentityError> for OrderError {
    fn from(value: IdentityError) -> Self {
        Self::Unauthorized(value.to_string())
    }
}

/// Error shape handed to callers. Messages for client faults are passed
/// through; server faults only carry their message for logging.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("bad gateway: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::NotFound { .. } => 404,
            Self::BadGateway { .. } => 502,
            Self::Internal { .. } => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "validation_error",
            Self::Unauthorized { .. } => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::BadGateway { .. } => "upstream_unavailable",
            Self::Internal { .. } => "internal_error",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::NotFound { message, .. } => message.clone(),
            Self::BadGateway { .. } => {
                "A dependent service is temporarily unavailable. Please retry shortly.".to_string()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_string(),
        }
    }
}

impl OrderError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<OrderError> for InterfaceError {
    fn from(value: OrderError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            OrderError::Validation(message) => Self::BadRequest { message, correlation_id },
            OrderError::Unauthorized(message) => Self::Unauthorized { message, correlation_id },
            OrderError::NotFound(message) => Self::NotFound { message, correlation_id },
            OrderError::UpstreamUnavailable(message) => Self::BadGateway { message, correlation_id },
            OrderError::Persistence(message) => Self::Internal { message, correlation_id },
            OrderError::Domain(error) => Self::Internal { message: error.to_string(), correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::CatalogError;
    use crate::domain::product::ProductId;
    use crate::errors::{DomainError, InterfaceError, OrderError};
    use crate::pricing::PricingError;

    #[test]
    fn validation_error_maps_to_bad_request_with_message() {
        let interface =
            OrderError::Validation("items must not be empty".to_owned()).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(interface.status_code(), 400);
        assert_eq!(interface.user_message(), "items must not be empty");
    }

    #[test]
    fn persistence_error_hides_details() {
        let interface = OrderError::Persistence("UNIQUE constraint failed: orders.id".to_owned())
            .into_interface("req-2");

        assert_eq!(interface.status_code(), 500);
        assert_eq!(interface.code(), "internal_error");
        assert!(!interface.user_message().contains("UNIQUE"));
    }

    #[test]
    fn catalog_errors_split_between_not_found_and_upstream() {
        let missing = OrderError::from(CatalogError::NotFound(ProductId(9)));
        assert!(matches!(missing, OrderError::NotFound(_)));

        let down = OrderError::from(CatalogError::Unavailable {
            product_id: ProductId(9),
            reason: "connection refused".to_owned(),
        });
        let interface = down.into_interface("req-3");
        assert_eq!(interface.status_code(), 502);
        assert!(!interface.user_message().contains("refused"));
    }

    #[test]
    fn pricing_and_domain_errors_map_to_expected_classes() {
        let pricing = OrderError::from(PricingError::NoLines).into_interface("req-4");
        assert_eq!(pricing.status_code(), 400);

        let domain = OrderError::from(DomainError::InvariantViolation("total".to_owned()))
            .into_interface("req-5");
        assert_eq!(domain.status_code(), 500);
        assert_eq!(domain.correlation_id(), "req-5");
    }
}
