use crate::models::LocalProduct;
use crate::store::{self, StoreError};
use std::path::Path;

/// Loads the price-list extraction output. Unlike the pipeline's own
/// stores, this file is required input: a missing file is an error, not an
/// empty run.
pub fn load(path: &Path) -> Result<Vec<LocalProduct>, StoreError> {
    store::read_json(path)?.ok_or_else(|| StoreError::Missing {
        path: path.to_path_buf(),
    })
}

/// Writes the annotated records back in full. Row-level persistence is
/// deliberately not supported; the collaborator owns the file format.
pub fn save(path: &Path, products: &[LocalProduct]) -> Result<(), StoreError> {
    store::write_json_atomic(path, products)
}
