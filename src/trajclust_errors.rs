use thiserror::Error;

/// Structural violations of the tdump text format.
///
/// A file raising one of these is skipped by every batch sweep; the sweep goes on
/// with its siblings.
///
/// Variants
/// -----------------
/// * `MissingDirectionLine` – no `<int> BACKWARD|FORWARD` line in the file.
/// * `MissingVariableMarker` – no `<int> PRESSURE ...` line after the direction line.
/// * `OriginCountMismatch` – the declared origin count differs from the origin lines found.
/// * `UnresolvedIdColumn` – neither of the first two columns holds exactly the ids `1..=N`.
/// * `MalformedRow` – a data row is too short or holds a non-numeric required field.
/// * `UnknownTrajectoryId` – a data row references an id outside `1..=N`.
/// * `MalformedOrigin` – an origin line cannot be decoded.
/// * `NoDataRows` – the document has no data row at all.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum FormatError {
    #[error("no direction line (<count> BACKWARD|FORWARD) found")]
    MissingDirectionLine,
    #[error("no variable marker line (<count> PRESSURE ...) found after the direction line")]
    MissingVariableMarker,
    #[error("direction line declares {declared} origins but {found} origin lines were found")]
    OriginCountMismatch { declared: usize, found: usize },
    #[error("cannot resolve the trajectory id column for {origins} origins")]
    UnresolvedIdColumn { origins: usize },
    #[error("malformed data row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },
    #[error("data row at line {line} references trajectory id {id} outside 1..={origins}")]
    UnknownTrajectoryId {
        line: usize,
        id: usize,
        origins: usize,
    },
    #[error("malformed origin line at line {line}: {reason}")]
    MalformedOrigin { line: usize, reason: String },
    #[error("document has no data rows")]
    NoDataRows,
}

/// Numeric or structural mismatches only detectable at the algorithmic level.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum DataError {
    #[error("trajectory {index} is not aligned with trajectory 0: {reason}")]
    Misaligned { index: usize, reason: String },
    #[error("{needed} samples are needed but only {available} were given")]
    InsufficientSamples { needed: usize, available: usize },
    #[error("cluster count {k} is out of range for {n} samples")]
    InvalidClusterCount { k: usize, n: usize },
    #[error("diagnostic table is empty or malformed: {0}")]
    InvalidDiagnosticTable(String),
    #[error("humidity column is missing in row at line {0}")]
    MissingHumidity(usize),
    #[error("no trajectory member is usable for averaging")]
    NoUsableMembers,
}

#[derive(Error, Debug)]
pub enum TrajclustError {
    #[error("Trajectory format error: {0}")]
    Format(#[from] FormatError),

    #[error("Trajectory data error: {0}")]
    Data(#[from] DataError),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV writer error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Non UTF-8 path: {0}")]
    Utf8PathError(String),

    #[error("Cannot attribute a year to {0}")]
    UnattributedYear(String),

    #[error("Batch produced no output: {0}")]
    EmptyBatch(String),
}

impl PartialEq for TrajclustError {
    fn eq(&self, other: &Self) -> bool {
        use TrajclustError::*;
        match (self, other) {
            (Format(a), Format(b)) => a == b,
            (Data(a), Data(b)) => a == b,

            // not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (Utf8PathError(a), Utf8PathError(b)) => a == b,
            (UnattributedYear(a), UnattributedYear(b)) => a == b,
            (EmptyBatch(a), EmptyBatch(b)) => a == b,

            _ => false,
        }
    }
}
