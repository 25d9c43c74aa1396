//! # Convolution Shape Utilities
//!
//! Output-size arithmetic for square-kernel convolutions and for
//! ceiling-mode pooling.

/// Predict the output size of a 1D convolution operation.
///
/// ```text
/// out_size = floor( ((in_size + 2*padding - dilation*(kernel_size-1) - 1) / stride) + 1 )
/// ```
///
/// # Arguments
///
/// - `input_size`: The input dimension size.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the convolution, must be > 0.
/// - `padding`: The padding of the convolution, added evenly to both sides of the input.
/// - `dilation`: The dilation of the convolution, must be > 0.
///
/// # Returns
///
/// An `Option<usize>` representing the output size; or `None` for an empty
/// input or an output <= 0.
pub fn maybe_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    assert!(kernel_size > 0);
    assert!(stride > 0);
    assert!(dilation > 0);

    if input_size == 0 {
        return None;
    }

    let effective_size = input_size + 2 * padding;
    let pos = effective_size + stride;
    let kernel_width = 1 + dilation * (kernel_size - 1);

    if pos < kernel_width {
        return None;
    }
    let x = (pos - kernel_width) / stride;
    if x < 1 { None } else { Some(x) }
}

/// Predict the output size of a 1D convolution operation.
///
/// This is the ``panic``-ing variant of [`maybe_conv1d_output_size`].
///
/// # Panics
///
/// If the output size would be <= 0.
pub fn expect_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    match maybe_conv1d_output_size(input_size, kernel_size, stride, padding, dilation) {
        Some(x) => x,
        None => panic!(
            "No legal output size for conv1d with:\n input_size:{input_size}\n kernel_size:{kernel_size}\n stride:{stride}\n dilation:{dilation}\n padding:{padding}",
        ),
    }
}

/// The "same" padding for an odd square kernel: ``(kernel_size - 1) / 2``.
///
/// With stride 1 this preserves the spatial size.
#[inline(always)]
pub fn same_padding(kernel_size: usize) -> usize {
    (kernel_size - 1) / 2
}

/// Output size of an unpadded pooling window in ceiling mode.
///
/// ```text
/// out_size = ceil( (in_size - kernel_size) / stride ) + 1
/// ```
///
/// An input smaller than the kernel yields a single (partial) window.
pub fn ceil_pool1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
) -> usize {
    assert!(input_size > 0);
    assert!(kernel_size > 0);
    assert!(stride > 0);

    if input_size <= kernel_size {
        1
    } else {
        (input_size - kernel_size).div_ceil(stride) + 1
    }
}

/// Trailing padding required to realize [`ceil_pool1d_output_size`] with a
/// floor-mode pooling layer.
pub fn ceil_pool1d_trailing_padding(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
) -> usize {
    let out = ceil_pool1d_output_size(input_size, kernel_size, stride);
    (out - 1) * stride + kernel_size - input_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv1d_output_shape() {
        fn conv1d_output_size_reference(
            input_shape: usize,
            kernel_shape: usize,
            stride: usize,
            padding: usize,
            dilation: usize,
        ) -> Option<usize> {
            let input_shape = input_shape as f64;
            let kernel_shape = kernel_shape as f64;
            let stride = stride as f64;
            let dilation = dilation as f64;
            let padding = padding as f64;

            let effective_shape = input_shape + 2.0 * padding;
            let kernel_width = 1.0 + dilation * (kernel_shape - 1.0);

            let x = (((effective_shape - kernel_width) / stride) + 1.0).floor();
            if x < 1.0 { None } else { Some(x as usize) }
        }

        for input_shape in 1..10 {
            for stride in 1..3 {
                for kernel_shape in 1..4 {
                    for padding in 0..4 {
                        assert_eq!(
                            maybe_conv1d_output_size(input_shape, kernel_shape, stride, padding, 1),
                            conv1d_output_size_reference(input_shape, kernel_shape, stride, padding, 1)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_same_padding_preserves_size() {
        for kernel_size in [1, 3, 5, 7] {
            for input_size in [7, 8, 13, 56] {
                let padding = same_padding(kernel_size);
                assert_eq!(
                    expect_conv1d_output_size(input_size, kernel_size, 1, padding, 1),
                    input_size
                );
            }
        }
        assert_eq!(same_padding(7), 3);
        assert_eq!(same_padding(1), 0);
    }

    #[test]
    fn test_ceil_pool1d_output_size() {
        assert_eq!(ceil_pool1d_output_size(8, 2, 2), 4);
        assert_eq!(ceil_pool1d_output_size(7, 2, 2), 4);
        assert_eq!(ceil_pool1d_output_size(1, 2, 2), 1);
        assert_eq!(ceil_pool1d_output_size(2, 2, 2), 1);

        assert_eq!(ceil_pool1d_trailing_padding(8, 2, 2), 0);
        assert_eq!(ceil_pool1d_trailing_padding(7, 2, 2), 1);
        assert_eq!(ceil_pool1d_trailing_padding(1, 2, 2), 1);
    }

    #[test]
    fn test_maybe_conv1d_output_size_empty_input() {
        assert_eq!(maybe_conv1d_output_size(0, 7, 2, 3, 1), None);
        assert_eq!(maybe_conv1d_output_size(1, 7, 2, 3, 1), Some(1));
        assert_eq!(maybe_conv1d_output_size(2, 5, 1, 0, 1), None);
    }

    #[test]
    #[should_panic(expected = "No legal output size for conv1d")]
    fn test_expect_conv1d_output_size_panics() {
        expect_conv1d_output_size(2, 5, 1, 0, 1);
    }
}
