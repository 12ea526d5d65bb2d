use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::LoadError;
use crate::models::{entities_from_rows, Entity, EntityPage, TaxonomyRow};

/// Dataset files are either a bare array or a saved `/entities` response
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityFile {
    Bare(Vec<serde_json::Value>),
    Page(EntityPage),
}

/// Load entities from a JSON file
pub fn load_entities<P: AsRef<Path>>(path: P) -> Result<Vec<Entity>, LoadError> {
    let entities = match read_json(path.as_ref())? {
        EntityFile::Bare(rows) => entities_from_rows(rows),
        EntityFile::Page(page) => page.data,
    };
    Ok(entities)
}

/// Load the taxonomy reference table from a JSON array of rows
pub fn load_taxonomy_rows<P: AsRef<Path>>(path: P) -> Result<Vec<TaxonomyRow>, LoadError> {
    read_json(path.as_ref())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| LoadError::Json {
        path: path.display().to_string(),
        source,
    })
}
