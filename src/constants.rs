pub const PROBABILITY_CLIP:   f64 = 1e-15;
pub const HESSIAN_FLOOR:      f64 = 1e-6;
pub const ALPHA_SUM_TOLERANCE: f64 = 1e-6;
pub const FD_STEP:            f64 = 1e-6;
pub const ARMIJO_C:           f64 = 1e-4;
pub const MIN_LINE_STEP:      f64 = 1e-10;

pub const DEFAULT_OPTIM_INTERVAL:  usize = 20;
pub const DEFAULT_MAX_OPTIM_ITER:  usize = 100;
pub const DEFAULT_OPTIM_TOLERANCE: f64   = 1e-6;
pub const DEFAULT_MU_BOUNDS: (f64, f64)  = (0.05, 1.0);

pub const BUFFER_SIZE:         usize = 256;
pub const PRINT_WIDTH_BINNING: usize =   3;
