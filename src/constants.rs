//! # System Constants
//!
//! Authority status strings, ambient codes, and DTE wire codes shared across
//! the transmission and contingency layers. These values mirror the tax
//! authority's reception API and must not be localized or renamed.

/// Statuses returned by the Authority's reception and consultation endpoints.
pub mod authority_status {
    /// Document accepted and stamped.
    pub const PROCESADO: &str = "PROCESADO";
    /// Document rejected for a content/business reason.
    pub const RECHAZADO: &str = "RECHAZADO";
    /// Batch acknowledged, resolution pending.
    pub const RECIBIDO: &str = "RECIBIDO";
    /// Batch still being processed by the Authority.
    pub const EN_PROCESO: &str = "EN PROCESO";
}

/// Ambient (environment) codes carried in every wire envelope.
pub mod ambient {
    /// Certification / test environment.
    pub const TEST: &str = "00";
    /// Production environment.
    pub const PRODUCTION: &str = "01";
}

/// Authority endpoint paths, relative to the configured base URL.
pub mod endpoints {
    pub const AUTH: &str = "/seguridad/auth";
    pub const RECEPTION: &str = "/fesv/recepciondte";
    pub const INVALIDATION: &str = "/fesv/anulardte";
    pub const CONSULT: &str = "/fesv/recepcion/consultadte";
    pub const BATCH_RECEPTION: &str = "/fesv/recepcionlote";
    pub const BATCH_CONSULT: &str = "/fesv/recepcion/consultadtelote";
    pub const CONTINGENCY_NOTICE: &str = "/fesv/contingencia";
}

/// Schema versions for the wire envelopes.
pub mod wire_version {
    pub const RECEPTION: u32 = 1;
    pub const INVALIDATION: u32 = 2;
    pub const BATCH: u32 = 1;
    pub const CONTINGENCY: u32 = 3;
}

/// Rejection description markers the classifier keys on. The Authority does
/// not publish machine-readable reason codes for these conditions, only
/// description text.
pub mod rejection_markers {
    pub const MAINTENANCE: &str = "mantenimiento";
    pub const OVERLOAD: &str = "sobrecarga";
    pub const VALIDATION: &str = "validacion";
    pub const AUTHORIZATION: &str = "autorizacion";
}
