use edge_preview::{EdgeFilter, FilteredFrame, FrameExchange, RawFrame};
use proptest::prelude::*;

/// Packs the input unchanged so every frame can be identified by its pixels
struct CopyFilter;

impl EdgeFilter for CopyFilter {
    fn apply(&mut self, src: &RawFrame<'_>, dst: &mut FilteredFrame) {
        let width = src.width() as usize;
        for (y, out) in dst.pixels_mut().chunks_exact_mut(width).enumerate() {
            out.copy_from_slice(src.row(y));
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Publish { width: u32, height: u32, pad: usize, value: u8 },
    Take,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u32..12, 1u32..12, 0usize..4, any::<u8>())
            .prop_map(|(width, height, pad, value)| Op::Publish { width, height, pad, value }),
        1 => Just(Op::Take),
    ]
}

fn plane(width: u32, height: u32, pad: usize, value: u8) -> Vec<u8> {
    let stride = width as usize + pad;
    let mut data = vec![0xEE; stride * height as usize];
    for row in data.chunks_exact_mut(stride) {
        row[..width as usize].fill(value);
    }
    data
}

proptest! {
    #[test]
    fn take_always_sees_latest_publish(ops in prop::collection::vec(op(), 1..64)) {
        let exchange = FrameExchange::new(Box::new(CopyFilter));
        let mut latest: Option<(u32, u32, u8)> = None;
        let mut pending = false;

        for op in ops {
            match op {
                Op::Publish { width, height, pad, value } => {
                    let data = plane(width, height, pad, value);
                    prop_assert!(exchange.publish_plane(&data, width, height, width as usize + pad));
                    latest = Some((width, height, value));
                    pending = true;
                }
                Op::Take => {
                    let taken = exchange.try_take_pending();
                    prop_assert_eq!(taken.is_some(), pending);
                    if let Some(frame) = taken {
                        let (width, height, value) = latest.unwrap();
                        prop_assert_eq!((frame.width(), frame.height()), (width, height));
                        prop_assert_eq!(frame.pixels().len(), (width * height) as usize);
                        prop_assert!(frame.pixels().iter().all(|&p| p == value));
                    }
                    pending = false;
                }
            }
        }
    }

    #[test]
    fn burst_without_take_yields_only_last(values in prop::collection::vec(any::<u8>(), 1..20)) {
        let exchange = FrameExchange::new(Box::new(CopyFilter));
        for &value in &values {
            exchange.publish_plane(&[value; 12], 4, 3, 4);
        }

        {
            let frame = exchange.try_take_pending().unwrap();
            let last = *values.last().unwrap();
            prop_assert!(frame.pixels().iter().all(|&p| p == last));
        }
        prop_assert!(exchange.try_take_pending().is_none());
        prop_assert_eq!(exchange.stats().dropped, values.len() as u64 - 1);
    }
}

#[test]
fn same_dimensions_reuse_the_slot_buffer() {
    let exchange = FrameExchange::new(Box::new(CopyFilter));
    let mut addresses = Vec::new();
    for value in 0..4u8 {
        exchange.publish_plane(&plane(6, 5, 2, value), 6, 5, 8);
        addresses.push(exchange.try_take_pending().unwrap().as_ptr());
    }
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
}
