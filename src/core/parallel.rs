//! Row- and scene-level work distribution.
//!
//! With the `parallel` feature the closures run on the rayon pool, otherwise
//! sequentially. Output order always follows input order.

use ndarray::{Array2, ArrayViewMut1, Axis};

#[cfg(feature = "parallel")]
pub(crate) fn map_rows<T, F>(rows: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> Vec<T> + Sync + Send,
{
    use rayon::prelude::*;

    let per_row: Vec<Vec<T>> = (0..rows).into_par_iter().map(f).collect();
    per_row.into_iter().flatten().collect()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn map_rows<T, F>(rows: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> Vec<T> + Sync + Send,
{
    (0..rows).flat_map(f).collect()
}

#[cfg(feature = "parallel")]
pub(crate) fn map_items<S, T, F>(items: &[S], f: F) -> Vec<T>
where
    S: Sync,
    T: Send,
    F: Fn(&S) -> T + Sync + Send,
{
    use rayon::prelude::*;

    items.par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn map_items<S, T, F>(items: &[S], f: F) -> Vec<T>
where
    S: Sync,
    T: Send,
    F: Fn(&S) -> T + Sync + Send,
{
    items.iter().map(f).collect()
}

/// Fill a grid in place, one closure call per row
#[cfg(feature = "parallel")]
pub(crate) fn fill_rows<T, F>(grid: &mut Array2<T>, f: F)
where
    T: Send + Sync,
    F: Fn(usize, ArrayViewMut1<'_, T>) + Sync + Send,
{
    use ndarray::parallel::prelude::*;

    grid.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, line)| f(row, line));
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn fill_rows<T, F>(grid: &mut Array2<T>, f: F)
where
    T: Send + Sync,
    F: Fn(usize, ArrayViewMut1<'_, T>) + Sync + Send,
{
    for (row, line) in grid.axis_iter_mut(Axis(0)).enumerate() {
        f(row, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rows_preserves_order() {
        let values = map_rows(50, |row| (0..3).map(|col| row * 3 + col).collect());
        assert_eq!(values, (0..150).collect::<Vec<_>>());
    }

    #[test]
    fn test_map_items_preserves_order() {
        let items: Vec<u32> = (0..100).collect();
        let doubled = map_items(&items, |v| v * 2);
        assert_eq!(doubled[99], 198);
        assert_eq!(doubled.len(), 100);
    }

    #[test]
    fn test_fill_rows_writes_every_cell_in_place() {
        let mut grid = Array2::<usize>::zeros((7, 5));
        fill_rows(&mut grid, |row, mut line| {
            for (col, cell) in line.iter_mut().enumerate() {
                *cell = row * 10 + col;
            }
        });
        assert_eq!(grid[[0, 0]], 0);
        assert_eq!(grid[[3, 4]], 34);
        assert_eq!(grid[[6, 2]], 62);
    }
}
