use std::fmt;
use std::str::FromStr;

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::{
        activation::{relu, softmax},
        TensorData,
    },
};
use serde::{Deserialize, Serialize};

use crate::domain::error::TrainError;

/// Named backbone widths. Each entry is one stride-2 conv block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backbone {
    CnnTiny,
    CnnSmall,
    CnnBase,
}

impl Backbone {
    pub fn name(self) -> &'static str {
        match self {
            Self::CnnTiny  => "cnn_tiny",
            Self::CnnSmall => "cnn_small",
            Self::CnnBase  => "cnn_base",
        }
    }

    pub fn channels(self) -> Vec<usize> {
        match self {
            Self::CnnTiny  => vec![16, 32],
            Self::CnnSmall => vec![32, 64, 128],
            Self::CnnBase  => vec![32, 64, 128, 256],
        }
    }

    pub fn config(self, num_outputs: usize, dropout: f64) -> GcnGraderConfig {
        GcnGraderConfig::new(self.channels(), num_outputs, dropout)
    }
}

impl fmt::Display for Backbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backbone {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cnn_tiny"  => Ok(Self::CnnTiny),
            "cnn_small" => Ok(Self::CnnSmall),
            "cnn_base"  => Ok(Self::CnnBase),
            _ => Err(TrainError::config(format!("unknown architecture '{s}'"))),
        }
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct GcnGraderConfig {
    pub channels:    Vec<usize>,
    pub num_outputs: usize,
    pub dropout:     f64,
}

impl GcnGraderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GcnGrader<B> {
        let mut in_ch = 3;
        let blocks: Vec<ConvBlock<B>> = self
            .channels
            .iter()
            .map(|&out_ch| {
                let block = ConvBlock::new(in_ch, out_ch, device);
                in_ch = out_ch;
                block
            })
            .collect();

        let n = self.num_outputs;
        let mut eye = vec![0.0f32; n * n];
        for i in 0..n {
            eye[i * n + i] = 1.0;
        }
        let adjacency = Param::from_tensor(Tensor::from_data(TensorData::new(eye, [n, n]), device));

        GcnGrader {
            blocks,
            pool:       AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout:    DropoutConfig::new(self.dropout).init(),
            head:       LinearConfig::new(in_ch, n).init(device),
            adjacency,
            graph_proj: LinearConfig::new(n, n).init(device),
        }
    }
}

/// 3x3 stride-2 convolution, batch norm, ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_ch: usize, out_ch: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_ch, out_ch], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm = BatchNormConfig::new(out_ch).init(device);
        Self { conv, norm }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.norm.forward(self.conv.forward(x)))
    }
}

/// Convolutional grader with a learnable label-correlation matrix.
///
/// The head's softmax is propagated through the row-normalised
/// matrix, projected back to the head width, and added to the logits.
#[derive(Module, Debug)]
pub struct GcnGrader<B: Backend> {
    pub blocks:     Vec<ConvBlock<B>>,
    pub pool:       AdaptiveAvgPool2d,
    pub dropout:    Dropout,
    pub head:       Linear<B>,
    pub adjacency:  Param<Tensor<B, 2>>,
    pub graph_proj: Linear<B>,
}

pub struct ModelOutput<B: Backend> {
    /// [batch, num_outputs]
    pub prediction: Tensor<B, 2>,
    /// [num_outputs, num_outputs], rows sum to 1
    pub adjacency:  Tensor<B, 2>,
    /// [batch, last channel width]
    pub features:   Tensor<B, 2>,
}

impl<B: Backend> GcnGrader<B> {
    /// images: [batch, 3, H, W]
    pub fn forward(&self, images: Tensor<B, 4>) -> ModelOutput<B> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let features: Tensor<B, 2> = self.pool.forward(x).flatten(1, 3);

        let logits     = self.head.forward(self.dropout.forward(features.clone()));
        let adjacency  = softmax(self.adjacency.val(), 1);
        let propagated = softmax(logits.clone(), 1).matmul(adjacency.clone());
        let prediction = logits + self.graph_proj.forward(propagated);

        ModelOutput { prediction, adjacency, features }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model: GcnGrader<NdArray> = Backbone::CnnTiny.config(5, 0.0).init(&device);
        let images = Tensor::<NdArray, 4>::zeros([2, 3, 16, 16], &device);
        let out = model.forward(images);

        assert_eq!(out.prediction.dims(), [2, 5]);
        assert_eq!(out.adjacency.dims(), [5, 5]);
        assert_eq!(out.features.dims(), [2, 32]);

        let rows: Vec<f32> = out.adjacency.sum_dim(1).into_data().to_vec().unwrap();
        assert!(rows.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_regression_head_width() {
        let device = Default::default();
        let model: GcnGrader<NdArray> = Backbone::CnnTiny.config(1, 0.0).init(&device);
        let out = model.forward(Tensor::zeros([1, 3, 8, 8], &device));
        assert_eq!(out.prediction.dims(), [1, 1]);
    }

    #[test]
    fn test_backbone_names() {
        assert_eq!("cnn-small".parse::<Backbone>().unwrap(), Backbone::CnnSmall);
        assert_eq!(Backbone::CnnBase.channels().len(), 4);
        assert_eq!(Backbone::CnnTiny.to_string(), "cnn_tiny");
        assert!(matches!("resnet50".parse::<Backbone>(), Err(TrainError::Configuration(_))));
    }
}
