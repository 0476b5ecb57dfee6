use editnii::{CoordSpace, DisplaySpace, ImageGeometry, Space};
use nalgebra::{Matrix4, Point3, Rotation3, Vector3};
use proptest::prelude::*;

fn make_affine(pixdim: [f64; 3], angles: [f64; 3], origin: [f64; 3], mirror: bool) -> Matrix4<f64> {
    let rot = Rotation3::from_euler_angles(angles[0], angles[1], angles[2]);
    let mut scale = Vector3::new(pixdim[0], pixdim[1], pixdim[2]);
    if mirror {
        scale[0] = -scale[0];
    }
    let mut affine = rot.to_homogeneous() * Matrix4::new_nonuniform_scaling(&scale);
    for i in 0..3 {
        affine[(i, 3)] = origin[i];
    }
    affine
}

fn make_space(mirror: bool) -> DisplaySpace {
    let pixdim = [2.0, 2.5, 3.0];
    let affine = make_affine(pixdim, [0.1, -0.2, 0.3], [-90.0, 120.0, -60.0], mirror);
    let geometry = ImageGeometry::new(&[20, 30, 16], pixdim, affine).unwrap();
    DisplaySpace::new(geometry)
}

proptest! {
    #[test]
    fn transforms_are_inverse_pairs(
        sx in 0.2f64..5.0, sy in 0.2f64..5.0, sz in 0.2f64..5.0,
        ax in -3.0f64..3.0, ay in -1.5f64..1.5, az in -3.0f64..3.0,
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        mirror in any::<bool>(),
    ) {
        let affine = make_affine([sx, sy, sz], [ax, ay, az], [ox, oy, oz], mirror);
        let geometry = ImageGeometry::new(&[12, 9, 7], [sx, sy, sz], affine).unwrap();
        let mut ds = DisplaySpace::new(geometry);
        ds.set_custom_matrix(Matrix4::new_nonuniform_scaling(&Vector3::new(0.5, 2.0, 4.0))).unwrap();

        for a in Space::ALL {
            prop_assert_eq!(ds.transform(a.into(), a.into(), None), Matrix4::identity());
            for b in Space::ALL {
                let ab = ds.transform(a.into(), b.into(), None);
                let ba = ds.transform(b.into(), a.into(), None);
                let err = (ba * ab - Matrix4::<f64>::identity()).abs().max();
                prop_assert!(err < 1e-8, "{} -> {} round trip error {}", a, b, err);
            }
        }
    }

    #[test]
    fn voxels_survive_a_trip_through_display_space(
        x in 0usize..20, y in 0usize..30, z in 0usize..16,
        space in prop::sample::select(vec![Space::Id, Space::Pixdim, Space::PixdimFlip, Space::Affine]),
        mirror in any::<bool>(),
    ) {
        let mut ds = make_space(mirror);
        ds.set_space(space);
        let vox = Point3::new(x as f64, y as f64, z as f64);
        let display = ds.transform_coords(&[vox], CoordSpace::Voxel, CoordSpace::Display, false);
        let back = ds.transform_coords(&display, CoordSpace::Display, CoordSpace::Voxel, true);
        prop_assert_eq!(back[0], vox);
        prop_assert_eq!(ds.voxel_index(display[0]), Some([x, y, z]));
    }

    #[test]
    fn voxel_ties_round_up(v in 0i32..50, axis in 0usize..3) {
        let ds = make_space(false);
        let mut p = Point3::new(3.0, 4.0, 5.0);
        p[axis] = v as f64 + 0.5;
        let out = ds.transform_coords(&[p], CoordSpace::Voxel, CoordSpace::Voxel, true);
        prop_assert_eq!(out[0][axis], v as f64 + 1.0);
    }
}

#[test]
fn voxel_to_voxel_is_exact() {
    let ds = make_space(false);
    let p = Point3::new(2.0, 3.0, 4.0);
    let out = ds.transform_coords(&[p], CoordSpace::Voxel, CoordSpace::Voxel, false);
    assert_eq!(out[0], p);
    let out = ds.transform_coords(&[p], CoordSpace::Voxel, Space::Id.into(), true);
    assert_eq!(out[0], p);
}

#[test]
fn flip_only_with_positive_determinant() {
    // det > 0: pixdim-flip mirrors x
    let ds = make_space(false);
    assert!(ds.geometry().voxel_to_world().determinant() > 0.0);
    let pix = ds.transform(CoordSpace::Voxel, Space::Pixdim.into(), None);
    let flip = ds.transform(CoordSpace::Voxel, Space::PixdimFlip.into(), None);
    assert_ne!(pix, flip);
    let p = flip * nalgebra::Vector4::new(0.0, 0.0, 0.0, 1.0);
    assert!((p.x - 19.0 * 2.0).abs() < 1e-9);

    // det < 0: identical
    let ds = make_space(true);
    assert!(ds.geometry().voxel_to_world().determinant() < 0.0);
    for a in Space::ALL {
        assert_eq!(
            ds.transform(a.into(), Space::Pixdim.into(), None),
            ds.transform(a.into(), Space::PixdimFlip.into(), None)
        );
    }
}

#[test]
fn display_alias_follows_current_space() {
    let mut ds = make_space(false);
    ds.set_space(Space::Affine);
    assert_eq!(
        ds.transform(CoordSpace::Display, CoordSpace::World, None),
        Matrix4::identity()
    );
    assert_eq!(
        ds.transform(CoordSpace::Display, CoordSpace::Voxel, Some(Space::Id)),
        Matrix4::identity()
    );
    assert_eq!(
        ds.transform_by_name("display", "affine", None).unwrap(),
        Matrix4::identity()
    );
    assert!(ds.transform_by_name("talairach", "voxel", None).is_err());
}
