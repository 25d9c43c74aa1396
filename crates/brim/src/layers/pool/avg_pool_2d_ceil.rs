use crate::compat::conv_shape::{ceil_pool1d_output_size, ceil_pool1d_trailing_padding};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`AvgPool2dCeil`] Config.
#[derive(Config, Debug)]
pub struct AvgPool2dCeilConfig {
    /// The size of the pooling window.
    #[config(default = "[2, 2]")]
    pub kernel_size: [usize; 2],

    /// The stride of the pooling window.
    #[config(default = "[2, 2]")]
    pub strides: [usize; 2],
}

impl AvgPool2dCeilConfig {
    /// Initialize a [`AvgPool2dCeil`].
    pub fn init(&self) -> AvgPool2dCeil {
        AvgPool2dCeil {
            pool: AvgPool2dConfig::new(self.kernel_size)
                .with_strides(self.strides)
                .with_padding(PaddingConfig2d::Valid)
                .with_count_include_pad(true)
                .init(),
        }
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        [
            ceil_pool1d_output_size(input_resolution[0], self.kernel_size[0], self.strides[0]),
            ceil_pool1d_output_size(input_resolution[1], self.kernel_size[1], self.strides[1]),
        ]
    }
}

/// Unpadded average pooling with ceiling-mode output rounding.
///
/// Windows which hang off the trailing edge of the input are averaged
/// over the elements they cover; the missing positions do not count
/// towards the divisor.
///
/// ```python,ignore
/// nn.AvgPool2D(kernel_size=2, stride=2, padding=0, ceil_mode=True)
/// ```
#[derive(Module, Clone, Debug)]
pub struct AvgPool2dCeil {
    pool: AvgPool2d,
}

impl AvgPool2dCeil {
    /// The size of the pooling window.
    pub fn kernel_size(&self) -> [usize; 2] {
        self.pool.kernel_size
    }

    /// The stride of the pooling window.
    pub fn strides(&self) -> [usize; 2] {
        self.pool.stride
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let [kh, kw] = self.kernel_size();
        let [sh, sw] = self.strides();
        [
            ceil_pool1d_output_size(input_resolution[0], kh, sh),
            ceil_pool1d_output_size(input_resolution[1], kw, sw),
        ]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, ceil((in_height - k) / s) + 1, ceil((in_width - k) / s) + 1]``
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let [kh, kw] = self.kernel_size();
        let [sh, sw] = self.strides();

        let pad_h = ceil_pool1d_trailing_padding(height, kh, sh);
        let pad_w = ceil_pool1d_trailing_padding(width, kw, sw);
        if pad_h == 0 && pad_w == 0 {
            return self.pool.forward(input);
        }

        // Zero padding inflates the divisor of the edge windows;
        // dividing by the pooled coverage mask restores the exclusive mean.
        let mask: Tensor<B, 4> =
            Tensor::ones([1, 1, height, width], &input.device()).pad((0, pad_w, 0, pad_h), 0.0);
        let x = input.pad((0, pad_w, 0, pad_h), 0.0);

        self.pool.forward(x) / self.pool.forward(mask)
    }
}
