//! Rigid camera transforms built from the regressed pose parameters.

use crate::{common::*, model::params};

/// Converts axis-angle vectors in shape `[batch, 1, 3]` into homogeneous
/// rotation matrices in shape `[batch, 4, 4]`.
pub fn rot_from_axisangle(vec: &Tensor) -> Tensor {
    let batch = vec.size()[0];
    let options = (vec.kind(), vec.device());

    let angle = (vec * vec)
        .sum_dim_intlist(&[2], true, vec.kind())
        .sqrt();
    let axis = vec / (&angle + params::AXISANGLE_EPS);

    let ca = angle.cos().view([-1]);
    let sa = angle.sin().view([-1]);
    let c = -&ca + 1.0;

    let x = axis.select(2, 0).view([-1]);
    let y = axis.select(2, 1).view([-1]);
    let z = axis.select(2, 2).view([-1]);

    let xs = &x * &sa;
    let ys = &y * &sa;
    let zs = &z * &sa;
    let x_c = &x * &c;
    let y_c = &y * &c;
    let z_c = &z * &c;
    let xy_c = &x * &y_c;
    let yz_c = &y * &z_c;
    let zx_c = &z * &x_c;

    let zeros = Tensor::zeros(&[batch], options);
    let ones = Tensor::ones(&[batch], options);

    let entries = [
        &x * &x_c + &ca,
        &xy_c - &zs,
        &zx_c + &ys,
        zeros.shallow_clone(),
        &xy_c + &zs,
        &y * &y_c + &ca,
        &yz_c - &xs,
        zeros.shallow_clone(),
        &zx_c - &ys,
        &yz_c + &xs,
        &z * &z_c + &ca,
        zeros.shallow_clone(),
        zeros.shallow_clone(),
        zeros.shallow_clone(),
        zeros,
        ones,
    ];

    Tensor::stack(&entries, 1).view([batch, 4, 4])
}

/// Builds `[batch, 4, 4]` translation matrices from vectors in shape `[batch, 1, 3]`.
pub fn translation_matrix(translation: &Tensor) -> Tensor {
    let batch = translation.size()[0];
    let options = (translation.kind(), translation.device());

    let t = translation.view([batch, 3]);
    let tx = t.select(1, 0);
    let ty = t.select(1, 1);
    let tz = t.select(1, 2);
    let zeros = Tensor::zeros(&[batch], options);
    let ones = Tensor::ones(&[batch], options);

    let entries = [
        &ones,
        &zeros,
        &zeros,
        &tx,
        &zeros,
        &ones,
        &zeros,
        &ty,
        &zeros,
        &zeros,
        &ones,
        &tz,
        &zeros,
        &zeros,
        &zeros,
        &ones,
    ];

    Tensor::stack(&entries, 1).view([batch, 4, 4])
}

/// Converts the decoder's axis-angle and translation into a `[batch, 4, 4]`
/// transformation matrix. With `invert` the opposite direction is returned.
pub fn transformation_from_parameters(
    axisangle: &Tensor,
    translation: &Tensor,
    invert: bool,
) -> Tensor {
    let rotation = rot_from_axisangle(axisangle);

    if invert {
        let rotation = rotation.transpose(1, 2);
        let translation = translation_matrix(&(-translation));
        rotation.matmul(&translation)
    } else {
        let translation = translation_matrix(translation);
        translation.matmul(&rotation)
    }
}

/// Chains relative transforms into camera-to-world poses, starting at identity.
///
/// The k-th relative transform maps points of frame k into frame k + 1, so the
/// returned list is one longer than the input.
pub fn accumulate_trajectory(relatives: &[Tensor]) -> Vec<Tensor> {
    let (kind, device) = relatives
        .first()
        .map(|rel| (rel.kind(), rel.device()))
        .unwrap_or((Kind::Float, Device::Cpu));
    let origin = Tensor::eye(4, (kind, device));

    iter::once(origin.shallow_clone())
        .chain(relatives.iter().scan(origin, |world, rel| {
            *world = world.matmul(&rel.view([4, 4]).inverse());
            Some(world.shallow_clone())
        }))
        .collect()
}
