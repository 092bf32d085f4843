//! Search box geometry

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Edge length used when no box has been configured for a receptor
pub const DEFAULT_BOX_SIZE: i32 = 20;

/// Errors that can occur when working with search boxes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoxError {
    #[error("Invalid box size {0:?}: every dimension must be positive")]
    InvalidBox([i32; 3]),
}

/// An axis-aligned search box, as written to `<receptor>_config.txt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpec {
    /// Centre of the box in Angstroms
    pub center: Vector3<f64>,

    /// Edge lengths along x, y and z in Angstroms
    pub size: Vector3<i32>,
}

impl BoxSpec {
    pub fn new(center: Vector3<f64>, size: Vector3<i32>) -> Result<Self, BoxError> {
        check_size(&size)?;
        Ok(Self { center, size })
    }

    /// Minimum and maximum corners
    pub fn bounds(&self) -> Result<(Vector3<f64>, Vector3<f64>), BoxError> {
        check_size(&self.size)?;
        let half = self.size.map(|s| s as f64 / 2.0);
        Ok((self.center - half, self.center + half))
    }

    /// The eight corners of the box
    pub fn corners(&self) -> Result<[Vector3<f64>; 8], BoxError> {
        compute_corners(self.center, self.size)
    }

    /// The twelve edges of the box as pairs of corners.
    ///
    /// Each edge joins two corners whose indices differ in exactly one bit.
    pub fn edges(&self) -> Result<Vec<(Vector3<f64>, Vector3<f64>)>, BoxError> {
        let corners = self.corners()?;
        let mut edges = Vec::with_capacity(12);
        for from in 0..8usize {
            for bit in [4usize, 2, 1] {
                if from & bit == 0 {
                    edges.push((corners[from], corners[from | bit]));
                }
            }
        }
        Ok(edges)
    }
}

fn check_size(size: &Vector3<i32>) -> Result<(), BoxError> {
    if size.iter().any(|&s| s <= 0) {
        return Err(BoxError::InvalidBox([size.x, size.y, size.z]));
    }
    Ok(())
}

/// Compute the eight corners of the box centred on `center`.
///
/// Corner `4 * i + 2 * j + k` takes the maximum along x when `i == 1`, along
/// y when `j == 1` and along z when `k == 1`, the minimum otherwise.
pub fn compute_corners(
    center: Vector3<f64>,
    size: Vector3<i32>,
) -> Result<[Vector3<f64>; 8], BoxError> {
    check_size(&size)?;

    let half = size.map(|s| s as f64 / 2.0);
    let pick = |axis: usize, high: bool| {
        if high {
            center[axis] + half[axis]
        } else {
            center[axis] - half[axis]
        }
    };

    let mut corners = [Vector3::zeros(); 8];
    for (index, corner) in corners.iter_mut().enumerate() {
        *corner = Vector3::new(
            pick(0, index & 4 != 0),
            pick(1, index & 2 != 0),
            pick(2, index & 1 != 0),
        );
    }
    Ok(corners)
}

/// A cubic box of [`DEFAULT_BOX_SIZE`] centred on `center`
pub fn default_box(center: Vector3<f64>) -> BoxSpec {
    BoxSpec {
        center,
        size: Vector3::repeat(DEFAULT_BOX_SIZE),
    }
}
