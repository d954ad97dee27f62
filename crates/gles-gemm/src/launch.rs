//! Work-item launcher.
//!
//! A kernel is a body `Fn([x, y, z])` replicated over every point of a
//! [`Grid`]. Work-items never communicate and each one writes its own
//! destination tile, so rows of the grid can run on any thread.

use tracing::trace;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Launch grid in work-items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grid {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Grid {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Grid covering `extent` elements with `per_item` elements per
    /// work-item along each dimension.
    pub fn covering(extent: [usize; 3], per_item: [usize; 3]) -> Self {
        Self {
            x: extent[0].div_ceil(per_item[0]),
            y: extent[1].div_ceil(per_item[1]),
            z: extent[2].div_ceil(per_item[2]),
        }
    }

    pub fn num_work_items(&self) -> usize {
        self.x * self.y * self.z
    }

    pub fn is_empty(&self) -> bool {
        self.num_work_items() == 0
    }
}

/// Whether grid rows run on the rayon thread pool.
pub const fn is_parallel() -> bool {
    cfg!(feature = "parallel")
}

/// Run `body` once per work-item of `grid`.
pub fn launch<F>(name: &str, grid: Grid, body: F)
where
    F: Fn([usize; 3]) + Send + Sync,
{
    trace!(
        kernel = name,
        x = grid.x,
        y = grid.y,
        z = grid.z,
        "launch"
    );

    if grid.is_empty() {
        return;
    }

    let rows = grid.y * grid.z;
    let row = |r: usize| {
        let z = r / grid.y;
        let y = r % grid.y;
        for x in 0..grid.x {
            body([x, y, z]);
        }
    };

    #[cfg(feature = "parallel")]
    {
        (0..rows).into_par_iter().for_each(row);
    }

    #[cfg(not(feature = "parallel"))]
    {
        (0..rows).for_each(row);
    }
}
