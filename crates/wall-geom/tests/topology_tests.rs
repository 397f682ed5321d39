#![allow(missing_docs)]
use proptest::prelude::*;
use wall_geom::{RenderSurface, SurfaceError, Topology, TopologyDoc, TopologyError};
use wall_math::{Mat4, Vec3};

const CAVE: &str = r#"{
  "nodes": [
    {
      "hostname": "cave-1",
      "windows": [
        {
          "width": 1024, "height": 768, "fullscreen": true,
          "surfaces": [
            {
              "pixel_bottom_left": [0, 0], "pixel_top_right": [1023, 767],
              "bottom_left": [-5.0, 0.0, -5.0], "top_right": [5.0, 10.0, -5.0]
            }
          ]
        }
      ]
    },
    {
      "hostname": "cave-2",
      "windows": [
        {
          "width": 1024, "height": 768,
          "surfaces": [
            {
              "pixel_bottom_left": [0, 0], "pixel_top_right": [1023, 767],
              "bottom_left": [-5.0, 0.0, 5.0], "top_right": [-5.0, 10.0, -5.0],
              "top_left": [-5.0, 10.0, 5.0], "bottom_right": [-5.0, 0.0, -5.0]
            }
          ]
        }
      ]
    },
    {
      "hostname": "cave-1",
      "windows": [
        {
          "width": 800, "height": 600,
          "surfaces": [
            {
              "pixel_bottom_left": [0, 0], "pixel_top_right": [799, 599],
              "bottom_left": [5.0, 0.0, -5.0], "top_right": [5.0, 10.0, 5.0]
            }
          ]
        }
      ]
    }
  ]
}"#;

#[test]
fn corners_are_scaled_from_feet() {
    let topo = Topology::from_json(CAVE).unwrap();
    let front = &topo.nodes()[0].windows[0].surfaces[0];
    assert_eq!(front.bottom_left().to_array(), [-10.0, 0.0, -10.0]);
    assert_eq!(front.top_right().to_array(), [10.0, 20.0, -10.0]);
    assert!(front.w().approx_eq(&Vec3::new(0.0, 0.0, -1.0), 1e-6));
}

#[test]
fn left_wall_basis_faces_inward() {
    let topo = Topology::from_json(CAVE).unwrap();
    let left = &topo.nodes()[1].windows[0].surfaces[0];
    assert!(left.u().approx_eq(&Vec3::new(0.0, 0.0, -1.0), 1e-6));
    assert!(left.v().approx_eq(&Vec3::UNIT_Y, 1e-6));
    assert!(left.w().approx_eq(&Vec3::new(-1.0, 0.0, 0.0), 1e-6));
}

#[test]
fn shared_hostname_splits_by_rank() {
    let topo = Topology::from_json(CAVE).unwrap();
    assert_eq!(topo.node_for("cave-1", 0).unwrap().windows[0].width, 1024);
    assert_eq!(topo.node_for("cave-1", 1).unwrap().windows[0].width, 800);
    assert_eq!(topo.node_for("cave-1", 2).unwrap().windows[0].width, 1024);
    assert_eq!(topo.node_for("cave-2", 7).unwrap().hostname, "cave-2");
}

#[test]
fn unknown_host_is_an_error() {
    let topo = Topology::from_json(CAVE).unwrap();
    let err = topo.node_for("laptop", 1).unwrap_err();
    assert!(matches!(err, TopologyError::UnknownHost(h) if h == "laptop"));
}

#[test]
fn validation_reports_location() {
    let mut doc = TopologyDoc::from_json(CAVE).unwrap();
    doc.nodes[1].windows[0].surfaces[0].top_left = Some([-5.0, 10.0, 3.0]);
    let err = Topology::from_doc(&doc).unwrap_err();
    match err {
        TopologyError::InvalidSurface {
            hostname,
            window,
            surface,
            reason,
        } => {
            assert_eq!(hostname, "cave-2");
            assert_eq!((window, surface), (0, 0));
            assert!(matches!(reason, SurfaceError::NotRectangular { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn structural_errors() {
    let mut doc = TopologyDoc::from_json(CAVE).unwrap();
    doc.nodes[0].windows[0].width = 1;
    assert!(matches!(
        Topology::from_doc(&doc),
        Err(TopologyError::WindowTooSmall { width: 1, .. })
    ));

    let mut doc = TopologyDoc::from_json(CAVE).unwrap();
    doc.nodes[2].windows[0].surfaces.clear();
    assert!(matches!(
        Topology::from_doc(&doc),
        Err(TopologyError::NoSurfaces { .. })
    ));

    let mut doc = TopologyDoc::from_json(CAVE).unwrap();
    doc.nodes[0].hostname = "  ".into();
    assert!(matches!(
        Topology::from_doc(&doc),
        Err(TopologyError::EmptyHostname { node: 0 })
    ));

    let empty = TopologyDoc {
        world_scale: 2.0,
        nodes: Vec::new(),
    };
    assert!(matches!(Topology::from_doc(&empty), Err(TopologyError::NoNodes)));
    assert!(matches!(
        Topology::from_json("{ nodes: oops"),
        Err(TopologyError::Parse(_))
    ));
}

#[test]
fn load_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cave.json");
    std::fs::write(&path, CAVE).unwrap();
    let topo = Topology::load(&path).unwrap();
    assert_eq!(topo.nodes().len(), 3);
    assert!(topo.to_string().starts_with("3 node(s)"));
    assert!(matches!(
        Topology::load(dir.path().join("missing.json")),
        Err(TopologyError::Io(_))
    ));
}

#[test]
fn identity_transform_is_exact() {
    let topo = Topology::from_json(CAVE).unwrap();
    for node in topo.nodes() {
        for window in &node.windows {
            for s in &window.surfaces {
                assert_eq!(&s.transformed(&Mat4::identity()), s);
            }
        }
    }
}

fn rigid() -> impl Strategy<Value = Mat4> {
    (
        -3.1f32..3.1,
        -3.1f32..3.1,
        -3.1f32..3.1,
        -10.0f32..10.0,
        -10.0f32..10.0,
        -10.0f32..10.0,
    )
        .prop_map(|(p, y, r, tx, ty, tz)| {
            Mat4::cave_rotation(Vec3::new(p, y, r)).with_translation(Vec3::new(tx, ty, tz))
        })
}

fn any_surface() -> impl Strategy<Value = RenderSurface> {
    (rigid(), 2.0f32..20.0, 2.0f32..20.0).prop_map(|(pose, w, h)| {
        let bl = pose.transform_point(&Vec3::ZERO);
        let br = pose.transform_point(&Vec3::new(w, 0.0, 0.0));
        let tl = pose.transform_point(&Vec3::new(0.0, h, 0.0));
        let tr = pose.transform_point(&Vec3::new(w, h, 0.0));
        RenderSurface::from_world_corners(bl, tr, Some(tl), Some(br))
            .unwrap_or_else(|e| panic!("rigid rectangle rejected: {e}"))
    })
}

fn assert_orthonormal(s: &RenderSurface) -> Result<(), TestCaseError> {
    let (u, v, w) = (s.u(), s.v(), s.w());
    for axis in [u, v, w] {
        prop_assert!((axis.length() - 1.0).abs() <= 1e-5, "length {}", axis.length());
    }
    prop_assert!(u.dot(&v).abs() <= 1e-5);
    prop_assert!(u.dot(&w).abs() <= 1e-5);
    prop_assert!(v.dot(&w).abs() <= 1e-5);
    Ok(())
}

proptest! {
    #[test]
    fn basis_is_orthonormal(s in any_surface()) {
        assert_orthonormal(&s)?;
    }

    #[test]
    fn transformed_basis_stays_orthonormal(s in any_surface(), m in rigid()) {
        assert_orthonormal(&s.transformed(&m))?;
    }

    #[test]
    fn transform_then_transform_matches_product(s in any_surface(), a in rigid(), b in rigid()) {
        let twice = s.transformed(&a).transformed(&b);
        let once = s.transformed(&(b * a));
        for (x, y) in twice.world_corners().iter().zip(once.world_corners().iter()) {
            prop_assert!(x.approx_eq(y, 1e-3), "{x:?} vs {y:?}");
        }
        prop_assert!(twice.w().approx_eq(&once.w(), 1e-4));
    }
}
