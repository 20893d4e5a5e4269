use nalgebra_sparse::{CooMatrix, CsrMatrix};
use thiserror::Error;

/// Errors that can occur while building a lattice.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("lattice dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
}

/// The fixed topology of a sheet-like colony lattice.
///
/// A lattice of `width` zooid columns and `height` zooid rows has
/// `2 * width` nodes per row and `2 * width * height` nodes total.
/// Conduits (edges) between nodes follow a deterministic rule that
/// produces a hexagonal-ish mesh:
///
/// 1. each node connects to the next node in its row;
/// 2. the first node of each row connects to the last node of that row;
/// 3. every other node connects to the node ahead of it in the next row.
///
/// Conduits are enumerated in exactly that order, and the enumeration is
/// load-bearing: conductance vectors, incidence rows, and derived flows
/// and adaptation rates all align index-for-index with it. The topology
/// is immutable after construction; only conductivities change over a
/// simulation.
#[derive(Debug, Clone)]
pub struct Lattice {
    nodes_per_row: usize,
    rows: usize,
    tails: Vec<usize>,
    heads: Vec<usize>,
    xs: Vec<f64>,
    ys: Vec<f64>,
    ys_jig: Vec<f64>,
    adjacency: CsrMatrix<f64>,
    laplacian: CsrMatrix<f64>,
    incidence: CsrMatrix<f64>,
}

impl Lattice {
    /// Builds the lattice for `width` zooid columns and `height` zooid rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] if either dimension is zero.
    pub fn new(width: usize, height: usize) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }

        let nodes_per_row = 2 * width;
        let rows = height;
        let node_count = nodes_per_row * rows;

        // Layout positions, sheared per row so the jigged rows read as
        // hexagons when plotted. Not used by any solver computation.
        let mut xs = Vec::with_capacity(node_count);
        let mut ys = Vec::with_capacity(node_count);
        let mut ys_jig = Vec::with_capacity(node_count);
        for i in 0..node_count {
            let row = i / nodes_per_row;
            xs.push((i % nodes_per_row + row) as f64);
            ys.push(row as f64);
            ys_jig.push(row as f64 + 0.2 * (i % 2) as f64);
        }

        let (tails, heads) = Self::build_edges(nodes_per_row, rows);
        let edge_count = tails.len();

        // Upper-triangular adjacency, symmetrized to the full matrix.
        let mut upper = CooMatrix::new(node_count, node_count);
        for (&tail, &head) in tails.iter().zip(&heads) {
            upper.push(tail, head, 1.0);
        }
        let upper = CsrMatrix::from(&upper);
        let adjacency = &upper + &upper.transpose();

        // Degree is the diagonal of adjacency row sums; the unweighted
        // Laplacian here is adjacency - degree, so its rows sum to zero.
        let mut degree = CooMatrix::new(node_count, node_count);
        for (row, lane) in adjacency.row_iter().enumerate() {
            degree.push(row, row, lane.values().iter().sum());
        }
        let laplacian = &adjacency - &CsrMatrix::from(&degree);

        // Signed incidence: one row per conduit, -1 at the tail and +1 at
        // the head. The sign convention fixes flow direction as tail->head.
        let mut incidence = CooMatrix::new(edge_count, node_count);
        for (edge, (&tail, &head)) in tails.iter().zip(&heads).enumerate() {
            incidence.push(edge, tail, -1.0);
            incidence.push(edge, head, 1.0);
        }
        let incidence = CsrMatrix::from(&incidence);

        Ok(Self {
            nodes_per_row,
            rows,
            tails,
            heads,
            xs,
            ys,
            ys_jig,
            adjacency,
            laplacian,
            incidence,
        })
    }

    /// Enumerates conduit endpoints in the fixed order: sequential edges,
    /// then row-wrap edges, then next-row edges.
    fn build_edges(nodes_per_row: usize, rows: usize) -> (Vec<usize>, Vec<usize>) {
        let n = nodes_per_row;
        let node_count = n * rows;
        let mut tails = Vec::new();
        let mut heads = Vec::new();

        // Each node connects to the next, except across a row boundary.
        for i in 0..node_count {
            if i % n != n - 1 {
                tails.push(i);
                heads.push(i + 1);
            }
        }

        // Each row wraps from its first node back to its last.
        for row in 0..rows {
            tails.push(row * n);
            heads.push(row * n + n - 1);
        }

        // Every other node connects to the node ahead in the next row.
        let mut i = 1;
        while i < (rows - 1) * n {
            tails.push(i);
            heads.push(i + n - 1);
            i += 2;
        }

        (tails, heads)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes_per_row * self.rows
    }

    /// Number of internal conduits.
    pub fn edge_count(&self) -> usize {
        self.tails.len()
    }

    /// Nodes per lattice row (two per zooid column).
    pub fn nodes_per_row(&self) -> usize {
        self.nodes_per_row
    }

    /// Number of lattice rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Tail node of each conduit, in enumeration order.
    pub fn tails(&self) -> &[usize] {
        &self.tails
    }

    /// Head node of each conduit, in enumeration order.
    pub fn heads(&self) -> &[usize] {
        &self.heads
    }

    /// Node x positions for plotting.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Node y positions for plotting.
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Node y positions with the alternating hexagonal offset applied.
    pub fn ys_jig(&self) -> &[f64] {
        &self.ys_jig
    }

    /// Symmetric node adjacency matrix.
    pub fn adjacency(&self) -> &CsrMatrix<f64> {
        &self.adjacency
    }

    /// Unweighted graph Laplacian (adjacency minus degree).
    pub fn laplacian(&self) -> &CsrMatrix<f64> {
        &self.laplacian
    }

    /// Signed node-conduit incidence matrix for internal conduits.
    pub fn incidence(&self) -> &CsrMatrix<f64> {
        &self.incidence
    }
}
