use std::fmt;

/// Kind of value stored per voxel, fixed when a grid is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Vector,
}

impl ValueKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ValueKind::Scalar => 0,
            ValueKind::Vector => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValueKind::Scalar),
            1 => Some(ValueKind::Vector),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Scalar => write!(f, "scalar"),
            ValueKind::Vector => write!(f, "vector"),
        }
    }
}

/// Sampling scheme for continuous (world-space) queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Value of the closest voxel.
    Nearest,
    #[default]
    Trilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    Gaussian,
    Mean,
    Median,
}

/// Structuring element used by dilation and erosion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Neighbourhood {
    /// 6-connected
    Faces,
    /// 18-connected
    FacesEdges,
    /// 26-connected, the 3x3x3 cube
    #[default]
    FacesEdgesVertices,
}

impl Neighbourhood {
    pub(crate) fn offsets(self) -> Vec<glam::IVec3> {
        let mut offsets = Vec::with_capacity(26);
        for z in -1i32..=1 {
            for y in -1i32..=1 {
                for x in -1i32..=1 {
                    let manhattan = x.abs() + y.abs() + z.abs();
                    let keep = match self {
                        Neighbourhood::Faces => manhattan == 1,
                        Neighbourhood::FacesEdges => manhattan == 1 || manhattan == 2,
                        Neighbourhood::FacesEdgesVertices => manhattan > 0,
                    };
                    if keep {
                        offsets.push(glam::IVec3::new(x, y, z));
                    }
                }
            }
        }
        offsets
    }
}

/// Voxel-wise combination of two grids of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    Max,
    Min,
    Sum,
    Diff,
    Mul,
    /// Take the other grid's value wherever this grid's value is zero.
    IfZero,
}

/// Combination of a scalar grid with a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Sum,
    Diff,
    Mul,
    Div,
    Pow,
    Min,
    Max,
    Lt,
    Gt,
    Eq,
}
