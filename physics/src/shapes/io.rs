use super::ShapeConvex;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

#[derive(Debug, thiserror::Error)]
pub enum ShapeIoError {
    #[error("failed to access shape file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed shape file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Loads a hull saved with [`save_convex_shape`]. Derived data is rebuilt and the hull is
/// validated on load.
pub fn load_convex_shape(path: impl AsRef<Path>) -> Result<ShapeConvex, ShapeIoError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let shape = serde_json::from_reader(reader)?;

    Ok(shape)
}

pub fn save_convex_shape(path: impl AsRef<Path>, shape: &ShapeConvex) -> Result<(), ShapeIoError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, shape)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_save_load() {
        let points = [
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ];
        let hull = ShapeConvex::from_points(&points).unwrap();
        let path = std::env::temp_dir().join(format!("racer_hull_{}.json", std::process::id()));
        save_convex_shape(&path, &hull).unwrap();
        let loaded = load_convex_shape(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.vertices(), hull.vertices());
        assert_eq!(loaded.faces(), hull.faces());
        assert_eq!(loaded.unique_axes().len(), hull.unique_axes().len());
    }

    #[test]
    fn test_load_errors() {
        let missing = load_convex_shape("/definitely/not/here.json");
        assert!(matches!(missing, Err(ShapeIoError::Io(_))));

        // references a vertex that does not exist
        let json = r#"{"vertices":[[0,0,0],[1,0,0],[0,1,0],[0,0,1]],"faces":[[0,1,7]]}"#;
        assert!(serde_json::from_str::<ShapeConvex>(json).is_err());
    }
}
