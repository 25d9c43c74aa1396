//! # Classifier Head
//!
//! Global average pool, flatten, and a linear projection to class logits.
//! The projection weight is drawn from ``U(-1/sqrt(fan_in), 1/sqrt(fan_in))``;
//! the bias starts at zero.

use crate::utility::params::{
    ParamDescriptor, ParamInventory, RecordShapes, describe_param, join_path, param_shape,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// [`ClassifierHead`] Config.
#[derive(Config, Debug)]
pub struct ClassifierHeadConfig {
    /// Number of input features (channels).
    pub in_features: usize,

    /// Number of output classes.
    #[config(default = 1000)]
    pub num_classes: usize,
}

impl ClassifierHeadConfig {
    /// Bound of the uniform weight initializer.
    ///
    /// ``stdv = 1 / sqrt(in_features)``
    pub fn init_bound(&self) -> f64 {
        1.0 / (self.in_features as f64).sqrt()
    }

    /// Initialize a [`ClassifierHead`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ClassifierHead<B> {
        let stdv = self.init_bound();
        let mut fc = LinearConfig::new(self.in_features, self.num_classes)
            .with_initializer(Initializer::Uniform {
                min: -stdv,
                max: stdv,
            })
            .init(device);
        fc.bias = fc
            .bias
            .map(|_| Param::from_tensor(Tensor::zeros([self.num_classes], device)));

        ClassifierHead {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc,
        }
    }
}

/// `ResNet` classifier head.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    /// Global average pool.
    pub pool: AdaptiveAvgPool2d,

    /// Class projection.
    pub fc: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    /// Number of input features.
    pub fn in_features(&self) -> usize {
        self.fc.weight.shape().dims[0]
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.shape().dims[1]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_features, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_features", "height", "width"],
            &input,
            &["batch"],
            &[("in_features", self.in_features())]
        );

        let x = self.pool.forward(input);
        let x = x.reshape([batch, self.in_features()]);
        let x = self.fc.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }
}

impl<B: Backend> ParamInventory for ClassifierHead<B> {
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    ) {
        params.push(describe_param(
            join_path(prefix, "fc.weight"),
            &self.fc.weight,
            1.0,
        ));
        if let Some(bias) = &self.fc.bias {
            params.push(describe_param(join_path(prefix, "fc.bias"), bias, 1.0));
        }
    }
}

impl<B: Backend> RecordShapes for ClassifierHeadRecord<B> {
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    ) {
        shapes.push((join_path(prefix, "fc.weight"), param_shape(&self.fc.weight)));
        if let Some(bias) = &self.fc.bias {
            shapes.push((join_path(prefix, "fc.bias"), param_shape(bias)));
        }
    }
}
