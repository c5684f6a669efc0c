use tabletop_core::{DepthFrame, PlaneModel, RegionOfInterest, StageError, TableSurface};
use tabletop_surface::{
    HeightGridBuilder, PlaneFitter, RoiDetector, SurfaceEstimator, SurfaceParams, ViewingMode,
};

/// Table at 1000mm over an invalid background, with a 5x5 patch at 950mm.
fn table_with_patch() -> DepthFrame {
    let mut frame = DepthFrame::filled(320, 240, 0).unwrap();
    frame.fill_rect(40, 30, 240, 180, 1000);
    frame.fill_rect(150, 110, 5, 5, 950);
    frame
}

#[test]
fn surface_chain_on_flat_table() {
    let frame = table_with_patch();
    let view = frame.view();

    let mut surface = TableSurface::new(15);
    let depth = SurfaceEstimator::default()
        .update(&mut surface, &view, ViewingMode::Overhead)
        .unwrap();
    assert_eq!(depth, 1000);

    let roi = RoiDetector::default()
        .propose(&view, depth, ViewingMode::Overhead)
        .unwrap();
    assert!(roi.contains(150, 110) && roi.contains(154, 114));

    let (plane, err) = PlaneFitter::default().fit_or_flat(&view, &roi, depth, ViewingMode::Angled);
    assert!(err.is_none());
    assert!(plane.tilt_deg() < 0.1);

    let grid = HeightGridBuilder::default().build(&view, &roi, &plane);
    assert_eq!(grid.occupied_cells(), grid.cells.iter().filter(|c| c.avg_height_mm == 50).count());
    assert_eq!(grid.max_height_mm(), 50);
}

#[test]
fn estimate_stays_in_search_range() {
    let params = SurfaceParams {
        min_depth_mm: 800,
        max_depth_mm: 1200,
        ..SurfaceParams::default()
    };
    let estimator = SurfaceEstimator::new(params.clone());
    let mut frame = DepthFrame::filled(320, 240, 600).unwrap();
    frame.fill_rect(60, 40, 200, 160, 1100);
    let est = estimator
        .estimate(&frame.view(), ViewingMode::Angled)
        .unwrap();
    assert!(est.depth_mm >= params.min_depth_mm && est.depth_mm <= params.max_depth_mm);
    assert_eq!(est.depth_mm, 1100);

    let mut surface = TableSurface::new(15);
    surface.set_depth(1000);
    let out_of_range = DepthFrame::filled(320, 240, 2500).unwrap();
    let err = estimator
        .update(&mut surface, &out_of_range.view(), ViewingMode::Angled)
        .unwrap_err();
    assert!(matches!(err, StageError::InsufficientSamples { .. }));
    assert_eq!(surface.depth_mm(), 1000);
}

#[test]
fn flat_plane_matches_scalar_table_depth() {
    let frame = table_with_patch();
    let view = frame.view();
    let roi = RegionOfInterest::new(50, 40, 200, 150);
    let builder = HeightGridBuilder::default();
    let fitted = PlaneFitter::default().fit(&view, &roi, 1000).unwrap();
    let a = builder.build(&view, &roi, &fitted.plane);
    let b = builder.build(&view, &roi, &PlaneModel::flat(1000));
    assert_eq!(a.cells, b.cells);
}
