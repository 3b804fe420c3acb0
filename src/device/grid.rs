// The maximum number of groups in the second and third dimension of a CUDA grid. The first
// dimension allows up to 2^31 - 1 groups.
pub const CUDA_MAX_SECONDARY_GRID_DIM: i64 = 65535;

// Computes, for each logical dimension of a launch, the physical grid dimension it is mapped to.
// The logical dimension with the largest number of groups is mapped to the first physical
// dimension, which is the only one not limited by CUDA_MAX_SECONDARY_GRID_DIM. Launches with fewer
// than three dimensions are not permuted.
pub fn grid_permutation(num_groups: &[i64]) -> Vec<usize> {
    let mut perm = (0..num_groups.len()).collect::<Vec<usize>>();
    if num_groups.len() == 3 {
        let largest = num_groups.iter()
            .enumerate()
            .fold(0, |acc, (idx, n)| if *n > num_groups[acc] { idx } else { acc });
        perm.swap(0, largest);
    }
    perm
}

// The number of groups in each physical dimension after applying the permutation.
pub fn physical_grid(num_groups: &[i64], perm: &[usize]) -> Vec<i64> {
    let mut grid = vec![1; num_groups.len()];
    for (logical, physical) in perm.iter().enumerate() {
        grid[*physical] = num_groups[logical];
    }
    grid
}

pub fn fits_cuda_grid(grid: &[i64]) -> bool {
    grid.iter().skip(1).all(|n| *n <= CUDA_MAX_SECONDARY_GRID_DIM)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_dimensional_launch_is_identity() {
        assert_eq!(grid_permutation(&[100000]), vec![0]);
    }

    #[test]
    fn two_dimensional_launch_is_identity() {
        assert_eq!(grid_permutation(&[2, 100000]), vec![0, 1]);
    }

    #[test]
    fn largest_dimension_maps_to_first_axis() {
        let dims = [4, 8, 200000];
        let perm = grid_permutation(&dims);
        assert_eq!(perm, vec![2, 1, 0]);
        let grid = physical_grid(&dims, &perm);
        assert_eq!(grid, vec![200000, 8, 4]);
        assert!(fits_cuda_grid(&grid));
        assert!(!fits_cuda_grid(&dims));
    }

    #[test]
    fn first_dimension_largest_is_identity() {
        assert_eq!(grid_permutation(&[300, 2, 1]), vec![0, 1, 2]);
    }

    #[test]
    fn ties_keep_earliest_dimension() {
        assert_eq!(grid_permutation(&[5, 7, 7]), vec![1, 0, 2]);
    }
}
