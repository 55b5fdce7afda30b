//! Integration tests: whole chains built, navigated, serialised and
//! rebuilt through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::hash::Hasher;

use gsaimage_chain::modification::{
    Blur, CannyEdge, ColorMask, Crop, DomainCenters, DrawScale, Erase, FindContours,
    HoughTransform, Morphology, SobelFilter,
};
use gsaimage_chain::{
    ChainError, DecodeError, FilterPattern, GrayImage, ImageBuffer, KernelError, Modification,
    ModificationKind, ModificationNode, Point, PropertyValue, Region,
};
use siphasher::sip::SipHasher13;

/// Light background with a dark square and a dark horizontal bar.
fn specimen() -> ImageBuffer {
    ImageBuffer::Gray(GrayImage::from_fn(64, 48, |x, y| {
        let v = if (12..28).contains(&x) && (10..26).contains(&y) {
            20
        } else if y == 38 && (4..60).contains(&x) {
            10
        } else {
            200 + u8::try_from((x + y) % 40).unwrap()
        };
        image::Luma([v])
    }))
}

fn push(chain: ModificationNode, m: Modification) -> ModificationNode {
    ModificationNode::new(chain, m).unwrap()
}

/// A chain that exercises every variant at least once.
fn every_variant() -> ModificationNode {
    let mut chain = ModificationNode::initial(specimen()).unwrap();
    chain = push(
        chain,
        Modification::DrawScale(DrawScale {
            start: Point::new(0.0, 0.0),
            end: Point::new(9.0, 0.0),
            length: 5.0,
        }),
    );
    chain = push(
        chain,
        Modification::Crop(Crop {
            roi: Region::new(2, 2, 60, 44),
            angle: 0.0,
        }),
    );
    chain = push(
        chain,
        Modification::Crop(Crop {
            roi: Region::new(1, 1, 56, 40),
            angle: 2.5,
        }),
    );
    chain = push(chain, Modification::Blur(Blur { gaussian_size: 4 }));
    chain = push(chain, Modification::ColorMask(ColorMask { min: 5, max: 250 }));
    chain = push(chain, Modification::Erosion(Morphology { size: 3 }));
    chain = push(chain, Modification::Dilation(Morphology { size: 2 }));

    chain = push(chain, Modification::Erase(Erase::default()));
    chain
        .modify(|m| {
            m.erase_mut()?
                .push_stroke(vec![Point::new(40.0, 5.0), Point::new(42.0, 6.0)]);
            Ok(())
        })
        .unwrap();

    chain = push(chain, Modification::FilterPattern(FilterPattern::default()));
    let dims = chain.input_dimensions();
    chain
        .modify(|m| {
            let pattern = m.filter_pattern_mut()?;
            let filter = pattern.add_filter_layer(dims);
            pattern.set_roi(filter, Region::square(14, 12, 6))
        })
        .unwrap();
    chain
        .modify(|m| {
            let pattern = m.filter_pattern_mut()?;
            let erase = pattern.add_erase_layer(dims);
            pattern.erase(erase, &[Point::new(16.0, 14.0)], 2.0, true)?;
            Ok(())
        })
        .unwrap();

    chain = push(chain, Modification::DomainCenters(DomainCenters::default()));
    chain
        .modify(|m| {
            let centers = m.domain_centers_mut()?;
            centers.add_center(Point::new(10.0, 10.0));
            centers.add_center(Point::new(30.0, 20.0));
            Ok(())
        })
        .unwrap();

    chain = push(chain, Modification::SobelFilter(SobelFilter { half_size: 2 }));
    chain = push(chain, Modification::CannyEdge(CannyEdge::default()));
    chain = push(chain, Modification::BinaryMask);
    chain = push(chain, Modification::FindContours(FindContours::default()));
    chain = push(
        chain,
        Modification::HoughTransform({
            let mut hough = HoughTransform::default();
            hough.line_length = 20;
            hough
        }),
    );
    chain
}

#[test]
fn every_variant_is_in_the_fixture() {
    let chain = every_variant();
    let kinds: Vec<ModificationKind> = chain.to_list().iter().map(|n| n.kind()).collect();
    for kind in ModificationKind::ALL {
        assert!(kinds.contains(&kind), "fixture is missing {kind}");
    }
    assert_eq!(kinds[0], ModificationKind::InitialImage);
}

#[test]
fn round_trip_reproduces_every_output() {
    let original = every_variant();
    let text = gsaimage_chain::to_json(&original).unwrap();
    let rebuilt = gsaimage_chain::from_json(&text).unwrap();

    let before = original.to_list();
    let after = rebuilt.to_list();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.kind(), b.kind());
        assert_eq!(a.timestamp(), b.timestamp());
        assert_eq!(a.image(), b.image(), "output differs at {}", a.kind());
        assert_eq!(a.properties(), b.properties(), "properties differ at {}", a.kind());
    }
}

#[test]
fn rebuilt_chain_is_disjoint() {
    let original = every_variant();
    let mut rebuilt = gsaimage_chain::from_document(gsaimage_chain::to_document(&original).unwrap())
        .unwrap();
    rebuilt
        .back_traverse_mut(rebuilt.length() - 1)
        .unwrap()
        .set_image(ImageBuffer::Gray(GrayImage::from_pixel(8, 8, image::Luma([0]))))
        .unwrap();
    assert_eq!(original.root().image(), specimen());
}

#[test]
fn recompute_is_idempotent() {
    let mut chain = every_variant();
    chain.update_chain().unwrap();
    let first: Vec<ImageBuffer> = chain.to_list().iter().map(|n| n.image()).collect();
    chain.update_chain().unwrap();
    let second: Vec<ImageBuffer> = chain.to_list().iter().map(|n| n.image()).collect();
    assert_eq!(first, second);

    let before = chain.image();
    chain.update_image().unwrap();
    assert_eq!(chain.image(), before);
}

#[test]
fn navigation() {
    let chain = every_variant();
    let n = chain.length();
    assert!(n > 1);
    assert_eq!(chain.root().length(), 1);
    assert!(std::ptr::eq(chain.back_traverse(n - 1).unwrap(), chain.root()));
    assert!(std::ptr::eq(chain.back_traverse(0).unwrap(), &chain));
    assert!(matches!(
        chain.back_traverse(n),
        Err(ChainError::OutOfRange { requested, depth }) if requested == n && depth == n - 1
    ));
    let list = chain.to_list();
    assert!(std::ptr::eq(list[0], chain.root()));
    assert!(std::ptr::eq(list[n - 1], &chain));
}

#[test]
fn descendant_properties_win() {
    let mut root = ModificationNode::initial(specimen()).unwrap();
    root.set_property("scale", 1.0);
    root.set_property("operator", "lab 3");
    let mut leaf = push(root, Modification::Blur(Blur::default()));
    leaf.set_property("scale", 2.0);

    let merged = leaf.back_properties();
    assert_eq!(merged["scale"], PropertyValue::Number(2.0));
    assert_eq!(merged["operator"], PropertyValue::Text("lab 3".into()));
    assert_eq!(leaf.root().back_properties()["scale"].as_f64(), Some(1.0));
}

#[test]
fn domain_density_scenario() {
    let blank = ImageBuffer::Gray(GrayImage::from_pixel(100, 100, image::Luma([128])));
    let mut chain = ModificationNode::initial(blank).unwrap();
    chain = push(
        chain,
        Modification::DrawScale(DrawScale {
            start: Point::new(0.0, 50.0),
            end: Point::new(9.0, 50.0),
            length: 5.0,
        }),
    );
    assert_eq!(chain.properties()["scale"].as_f64(), Some(0.5));

    chain = push(chain, Modification::DomainCenters(DomainCenters::default()));
    for p in [(10.0, 10.0), (50.0, 50.0), (80.0, 20.0)] {
        chain
            .modify(|m| {
                m.domain_centers_mut()?.add_center(Point::new(p.0, p.1));
                Ok(())
            })
            .unwrap();
    }
    let density = chain.properties()["domain_density"].as_f64().unwrap();
    assert!((density - 0.0012).abs() < 1e-12, "density was {density}");
}

#[test]
fn color_mask_bounds_through_chain() {
    let row = ImageBuffer::Gray(GrayImage::from_raw(4, 1, vec![50, 51, 199, 200]).unwrap());
    let root = ModificationNode::initial(row).unwrap();
    let masked = push(root, Modification::ColorMask(ColorMask { min: 50, max: 200 }));
    assert_eq!(masked.output().as_raw(), &[255, 51, 199, 255]);
}

#[test]
fn masked_area_uses_inherited_scale() {
    let mut root = ModificationNode::initial(specimen()).unwrap();
    root.set_property("scale", 2.0);
    let mut chain = push(root, Modification::FilterPattern(FilterPattern::default()));
    let dims = chain.input_dimensions();
    chain
        .modify(|m| {
            let pattern = m.filter_pattern_mut()?;
            let filter = pattern.add_filter_layer(dims);
            pattern.set_roi(filter, Region::square(16, 14, 6))?;
            pattern.set_threshold(filter, 1000)?;
            Ok(())
        })
        .unwrap();
    let area = chain.properties()["masked_area"].as_f64().unwrap();
    let ImageBuffer::Gray(out) = chain.output() else {
        panic!("filter pattern keeps the input layout");
    };
    let kept = out.pixels().filter(|p| p.0[0] < 255).count();
    assert!(area >= 4.0 * f64::from(u32::try_from(kept).unwrap()));
    assert!(area > 0.0);
}

#[test]
fn no_selection_leaves_output_untouched() {
    let root = ModificationNode::initial(specimen()).unwrap();
    let mut chain = push(root, Modification::FilterPattern(FilterPattern::default()));
    assert_eq!(chain.image(), specimen());
    chain.update_image().unwrap();
    assert_eq!(chain.image(), specimen());
    assert!(!chain.properties().contains_key("masked_area"));
}

#[test]
fn kernel_skip_keeps_previous_output_and_reports() {
    let root = ModificationNode::initial(specimen()).unwrap();
    let mut chain = push(
        root,
        Modification::Crop(Crop {
            roi: Region::new(0, 0, 10, 10),
            angle: 0.0,
        }),
    );
    let cropped = chain.image();
    let result = chain.modify(|m| {
        m.crop_mut()?.roi = Region::new(500, 500, 3, 3);
        Ok(())
    });
    assert!(matches!(
        result,
        Err(ChainError::Kernel(KernelError::DegenerateRegion))
    ));
    assert_eq!(chain.image(), cropped);

    let skipped = chain.update_chain().unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].position, 1);
    assert_eq!(skipped[0].kind, ModificationKind::Crop);
}

#[test]
fn import_reports_document_and_rejects_wholesale() {
    let mut doc = gsaimage_chain::to_document(&every_variant()).unwrap();
    let mut level = &mut doc;
    for _ in 0..5 {
        level = &mut level["mod_in"];
    }
    level["@class"] = serde_json::json!("Sharpen");
    let text = serde_json::to_string(&doc).unwrap();

    let err = gsaimage_chain::import_document("run-42.json", &text).unwrap_err();
    match err {
        ChainError::Import { document, source } => {
            assert_eq!(document, "run-42.json");
            assert!(matches!(source, DecodeError::UnknownVariant(ref t) if t == "Sharpen"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn threshold_tick_is_log_spaced() {
    use gsaimage_chain::template::ScoreMap;

    let scores = ScoreMap {
        width: 1,
        height: 1,
        scores: vec![1000.0],
    };
    let th = scores.threshold(gsaimage_chain::MatchMethod::SqDiff, 500);
    let expected = 1000.0 * 10f64.powf(-3.0 + 499.0 * 3.0 / 999.0);
    assert!((th - expected).abs() < 1e-9);
    assert!((th - 31.513_635).abs() < 1e-6);
    // Normalised methods use 1 as the maximum score.
    let th = scores.threshold(gsaimage_chain::MatchMethod::SqDiffNormed, 1000);
    assert!((th - 1.0).abs() < 1e-12);
}

#[test]
fn blur_kernel_sizes_are_odd_and_not_smaller() {
    for k in 3..=51 {
        let effective = gsaimage_chain::blur::normalize_kernel_size(k);
        assert_eq!(effective % 2, 1, "size {k} became {effective}");
        assert!(effective >= k);
    }
}

/// Deterministic spread of awkward `f64` values in `[0, span)`.
#[allow(clippy::cast_precision_loss)]
fn scattered(count: u64, span: f64) -> impl Iterator<Item = f64> {
    (0..count).map(move |i| {
        let mut hasher = SipHasher13::new_with_keys(0x5eed, i);
        hasher.write_u64(i);
        (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64 * span
    })
}

fn reparse<T: serde::Serialize + serde::de::DeserializeOwned>(value: &T) -> T {
    serde_json::from_str(&serde_json::to_string(value).unwrap()).unwrap()
}

#[test]
fn float_parameters_survive_serialisation_exactly() {
    for v in scattered(5000, 1000.0) {
        let erase = Erase {
            radius: v,
            strokes: Vec::new(),
        };
        assert_eq!(reparse(&erase), erase, "radius {v:?}");

        let scale = DrawScale {
            start: Point::new(v / 3.0, v / 7.0),
            end: Point::new(v, v / 11.0),
            length: v * 0.3,
        };
        assert_eq!(reparse(&scale), scale, "draw scale {v:?}");

        let crop = Crop {
            roi: Region::new(1, 2, 3, 4),
            angle: v / 1000.0 * 360.0 - 180.0,
        };
        assert_eq!(reparse(&crop), crop, "angle {v:?}");

        let contours = FindContours {
            tolerance: v / 1000.0,
            area_threshold: 1.0 - v / 1000.0,
            ..FindContours::default()
        };
        assert_eq!(reparse(&contours), contours, "contours {v:?}");
    }
}

#[test]
fn scale_and_density_survive_round_trip_for_awkward_lengths() {
    for length in scattered(50, 100.0).map(|v| v + 0.1) {
        let mut chain = ModificationNode::initial(specimen()).unwrap();
        chain = push(
            chain,
            Modification::DrawScale(DrawScale {
                start: Point::new(1.0, 1.0),
                end: Point::new(13.0, 6.0),
                length,
            }),
        );
        chain = push(chain, Modification::DomainCenters(DomainCenters::default()));
        chain
            .modify(|m| {
                m.domain_centers_mut()?.add_center(Point::new(length / 10.0, 3.3));
                Ok(())
            })
            .unwrap();

        let text = gsaimage_chain::to_json(&chain).unwrap();
        let rebuilt = gsaimage_chain::from_json(&text).unwrap();
        for (a, b) in chain.to_list().iter().zip(rebuilt.to_list()) {
            assert_eq!(a.properties(), b.properties(), "length {length:?}");
        }
    }
}

#[test]
fn zero_length_scale_is_skipped_and_chain_still_exports() {
    let mut chain = ModificationNode::initial(specimen()).unwrap();
    chain = push(
        chain,
        Modification::DrawScale(DrawScale {
            start: Point::new(0.0, 0.0),
            end: Point::new(9.0, 0.0),
            length: 0.0,
        }),
    );
    assert_eq!(chain.last_skip(), Some(&KernelError::InvalidScale));
    assert!(!chain.properties().contains_key("scale"));

    chain = push(chain, Modification::DomainCenters(DomainCenters::default()));
    chain
        .modify(|m| {
            m.domain_centers_mut()?.add_center(Point::new(4.0, 4.0));
            Ok(())
        })
        .unwrap();
    let density = chain.properties()["domain_density"].as_f64().unwrap();
    assert!(density.is_finite());

    let text = gsaimage_chain::to_json(&chain).unwrap();
    let rebuilt = gsaimage_chain::from_json(&text).unwrap();
    assert_eq!(rebuilt.properties(), chain.properties());
    assert_eq!(
        rebuilt.predecessor().unwrap().last_skip(),
        Some(&KernelError::InvalidScale)
    );
}

#[test]
fn bad_inherited_scale_skips_density() {
    let mut root = ModificationNode::initial(specimen()).unwrap();
    root.set_property("scale", 0.0);
    let chain = push(root, Modification::DomainCenters(DomainCenters::default()));
    assert_eq!(chain.last_skip(), Some(&KernelError::InvalidScale));
    assert!(!chain.properties().contains_key("domain_density"));
}

#[test]
fn non_finite_property_is_refused_on_export() {
    let mut root = ModificationNode::initial(specimen()).unwrap();
    root.set_property("exposure", f64::NAN);
    let chain = push(root, Modification::BinaryMask);
    let err = gsaimage_chain::to_json(&chain).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::NonFiniteProperty { ref variant, ref key }
            if variant == "InitialImage" && key == "exposure"
    ));

    let mut root = ModificationNode::initial(specimen()).unwrap();
    root.set_property("histogram", vec![1.0, f64::INFINITY]);
    assert!(matches!(
        gsaimage_chain::to_document(&root),
        Err(DecodeError::NonFiniteProperty { .. })
    ));
}

#[test]
fn skipped_node_round_trips_the_output_it_kept() {
    let root = ModificationNode::initial(specimen()).unwrap();
    let mut chain = push(
        root,
        Modification::Crop(Crop {
            roi: Region::new(0, 0, 10, 10),
            angle: 0.0,
        }),
    );
    let result = chain.modify(|m| {
        m.crop_mut()?.roi = Region::new(500, 500, 3, 3);
        Ok(())
    });
    assert!(result.is_err());
    chain = push(chain, Modification::Blur(Blur { gaussian_size: 3 }));

    let doc = gsaimage_chain::to_document(&chain).unwrap();
    assert!(doc["held_output"].is_null());
    assert!(doc["mod_in"]["held_output"].is_array());

    let rebuilt = gsaimage_chain::from_document(doc).unwrap();
    for (a, b) in chain.to_list().iter().zip(rebuilt.to_list()) {
        assert_eq!(a.image(), b.image(), "output differs at {}", a.kind());
        assert_eq!(a.last_skip(), b.last_skip());
    }
    assert_eq!(rebuilt.input_dimensions(), gsaimage_chain::Dimensions::new(10, 10));
}
