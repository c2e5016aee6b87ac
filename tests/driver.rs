mod tests {
    use ws2812_dither::driver::RESET_FRAME_LEN;
    use ws2812_dither::encoder::{BYTES_PER_LED, PULSE_HIGH, PULSE_LOW};
    use ws2812_dither::{
        ConfigError, DriverState, MAX_DITHER_DEPTH, MAX_SUPPORTED_LEDS, SharedStrip, StripDriver,
        Transport,
    };

    /// Records every transfer and lets tests drive the completion interrupt.
    #[derive(Default)]
    struct MockTransport {
        busy: bool,
        sent: Vec<Vec<u8>>,
    }

    impl Transport for MockTransport {
        fn start_transfer(&mut self, buffer: &[u8]) {
            self.busy = true;
            self.sent.push(buffer.to_vec());
        }

        fn is_busy(&self) -> bool {
            self.busy
        }
    }

    fn driver(num_leds: usize, depth: u8) -> StripDriver<MockTransport> {
        StripDriver::new(MockTransport::default(), num_leds, depth).unwrap()
    }

    /// Simulate the peripheral finishing the in-flight transfer.
    fn complete(driver: &mut StripDriver<MockTransport>) {
        driver.transport_mut().busy = false;
        driver.handle_transfer_complete();
    }

    fn decode_channel(bytes: &[u8]) -> u8 {
        let mut value = 0u8;
        for &group in bytes {
            value <<= 1;
            match group {
                PULSE_HIGH => value |= 1,
                PULSE_LOW => {}
                other => panic!("not a pulse group: {other:#010b}"),
            }
        }
        value
    }

    /// Decode one LED from an encoded frame back to (r, g, b), GRB wire order.
    fn decode_led(frame: &[u8], index: usize) -> (u8, u8, u8) {
        let base = index * BYTES_PER_LED;
        let g = decode_channel(&frame[base..base + 8]);
        let r = decode_channel(&frame[base + 8..base + 16]);
        let b = decode_channel(&frame[base + 16..base + 24]);
        (r, g, b)
    }

    #[test]
    fn test_configuration_limits() {
        assert_eq!(
            StripDriver::new(MockTransport::default(), MAX_SUPPORTED_LEDS + 1, 0).err(),
            Some(ConfigError::TooManyLeds {
                requested: MAX_SUPPORTED_LEDS + 1,
                max: MAX_SUPPORTED_LEDS,
            })
        );
        assert_eq!(
            StripDriver::new(MockTransport::default(), 8, MAX_DITHER_DEPTH + 1).err(),
            Some(ConfigError::DepthOutOfRange {
                requested: MAX_DITHER_DEPTH + 1,
                max: MAX_DITHER_DEPTH,
            })
        );
        assert!(StripDriver::new(MockTransport::default(), MAX_SUPPORTED_LEDS, MAX_DITHER_DEPTH).is_ok());
    }

    #[test]
    fn test_new_driver_encodes_all_off() {
        let driver = driver(4, 2);
        for slot in 0..2 {
            let frame = driver.encoded_frame(slot).unwrap();
            assert_eq!(frame.len(), 4 * BYTES_PER_LED);
            // Off is a train of zero pulses, not raw zero bytes.
            assert!(frame.iter().all(|&byte| byte == PULSE_LOW));
        }
        assert!(driver.encoded_frame(2).is_none());
    }

    #[test]
    fn test_end_to_end_three_leds() {
        let mut driver = driver(3, 0);
        driver.set_led(0, 255, 0, 0);
        driver.set_led(1, 0, 255, 0);
        driver.set_led(2, 0, 0, 255);
        driver.start();

        // The leading transfer is the all-zero reset pulse.
        assert_eq!(driver.state(), DriverState::SendingReset);
        let reset = &driver.transport().sent[0];
        assert_eq!(reset.len(), RESET_FRAME_LEN);
        assert!(reset.iter().all(|&byte| byte == 0));

        complete(&mut driver);
        assert_eq!(driver.state(), DriverState::SendingColors);
        let frame = driver.transport().sent[1].clone();
        assert_eq!(frame.len(), 3 * BYTES_PER_LED);
        assert_eq!(decode_led(&frame, 0), (255, 0, 0));
        assert_eq!(decode_led(&frame, 1), (0, 255, 0));
        assert_eq!(decode_led(&frame, 2), (0, 0, 255));
    }

    #[test]
    fn test_transfers_alternate_colors_and_reset() {
        let mut driver = driver(2, 0);
        driver.start();
        for _ in 0..3 {
            assert_eq!(driver.state(), DriverState::SendingReset);
            complete(&mut driver);
            assert_eq!(driver.state(), DriverState::SendingColors);
            complete(&mut driver);
        }
        let lengths: Vec<usize> = driver.transport().sent.iter().map(Vec::len).collect();
        assert_eq!(
            lengths,
            [
                RESET_FRAME_LEN,
                2 * BYTES_PER_LED,
                RESET_FRAME_LEN,
                2 * BYTES_PER_LED,
                RESET_FRAME_LEN,
                2 * BYTES_PER_LED,
                RESET_FRAME_LEN,
            ]
        );
    }

    #[test]
    fn test_start_is_idempotent_and_busy_delegates() {
        let mut driver = driver(2, 0);
        assert!(!driver.busy());
        driver.start();
        assert!(driver.busy());
        driver.start();
        assert_eq!(driver.transport().sent.len(), 1);
    }

    #[test]
    fn test_stop_is_level_triggered() {
        let mut driver = driver(2, 0);
        driver.start();
        complete(&mut driver);
        assert_eq!(driver.state(), DriverState::SendingColors);

        // Stop while the color frame is still draining.
        driver.stop();
        assert_eq!(driver.state(), DriverState::Idle);
        let sent_before = driver.transport().sent.len();
        complete(&mut driver);
        // The drained transfer is not rechained.
        assert_eq!(driver.transport().sent.len(), sent_before);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut driver = driver(3, 1);
        let before = driver.encoded_frame(0).unwrap().to_vec();
        driver.set_led(3, 255, 255, 255);
        driver.set_led(usize::MAX, 1, 2, 3);
        assert_eq!(driver.encoded_frame(0).unwrap(), &before[..]);
        assert_eq!(driver.color_at(3), None);
    }

    #[test]
    fn test_clear_zeroes_all_leds() {
        let mut driver = driver(3, 0);
        driver.set_led(0, 10, 20, 30);
        driver.set_led(2, 40, 50, 60);
        driver.clear();
        let frame = driver.encoded_frame(0).unwrap();
        for index in 0..3 {
            assert_eq!(decode_led(frame, index), (0, 0, 0));
        }
    }

    #[test]
    fn test_dither_slots_carry_remainder_bits() {
        let mut driver = driver(1, 2);
        // 32768/65535 of full scale: baseline 127, remainder 2 (bit 1 set).
        driver.set_led_u16(0, 32768, 0, 0);
        let slot0 = driver.encoded_frame(0).unwrap();
        assert_eq!(decode_led(slot0, 0), (127, 0, 0));
        let slot1 = driver.encoded_frame(1).unwrap();
        assert_eq!(decode_led(slot1, 0), (128, 0, 0));
    }

    #[test]
    fn test_float_api_matches_u16_contract() {
        let mut by_f32 = driver(1, 4);
        let mut by_u16 = driver(1, 4);
        by_f32.set_led_f32(0, 0.5, 1.0, -2.0);
        by_u16.set_led_u16(0, 32768, 65535, 0);
        assert_eq!(
            by_f32.encoded_frame(0).unwrap(),
            by_u16.encoded_frame(0).unwrap()
        );
        assert_eq!(by_f32.color_at(0), by_u16.color_at(0));
    }

    #[test]
    fn test_frame_selection_follows_dither_counter() {
        let mut driver = driver(1, 2);
        driver.set_led_u16(0, 32768, 0, 0);
        driver.start();

        // Counter walks 1, 2, 3, 1, ... so the red channel of the frames on
        // the wire reads 127, 128, 128, 127 (slot = highest set bit).
        let mut reds = Vec::new();
        for _ in 0..4 {
            complete(&mut driver); // reset done, colors go out
            let frame = driver.transport().sent.last().unwrap().clone();
            reds.push(decode_led(&frame, 0).0);
            complete(&mut driver); // colors done, reset goes out
        }
        assert_eq!(reds, [127, 128, 128, 127]);
    }

    #[test]
    fn test_writes_to_in_flight_frame_are_deferred() {
        let mut driver = driver(1, 0);
        driver.start();
        complete(&mut driver);
        assert_eq!(driver.state(), DriverState::SendingColors);

        // The single frame slot is on the wire; staging a color now must not
        // touch it until the transfer ends.
        driver.set_led(0, 9, 8, 7);
        let frame = driver.encoded_frame(0).unwrap();
        assert_eq!(decode_led(frame, 0), (0, 0, 0));

        complete(&mut driver);
        let frame = driver.encoded_frame(0).unwrap();
        assert_eq!(decode_led(frame, 0), (9, 8, 7));

        // The next color transfer carries the deferred write.
        complete(&mut driver);
        let sent = driver.transport().sent.last().unwrap().clone();
        assert_eq!(decode_led(&sent, 0), (9, 8, 7));
    }

    #[test]
    fn test_shared_strip_routes_foreground_and_interrupt() {
        let shared: SharedStrip<MockTransport> = SharedStrip::new();
        assert_eq!(shared.with(|driver| driver.num_leds()), None);

        shared.init(driver(3, 1));
        shared.with(|driver| {
            driver.set_led(1, 4, 5, 6);
            driver.start();
        });
        shared.with(|driver| driver.transport_mut().busy = false);
        shared.on_transfer_complete();

        let (state, color) = shared
            .with(|driver| (driver.state(), driver.color_at(1)))
            .unwrap();
        assert_eq!(state, DriverState::SendingColors);
        assert_eq!(color.map(|c| (c.r, c.g, c.b)), Some((4, 5, 6)));
    }
}
