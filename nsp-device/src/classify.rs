use nsp_protocol::types::{AnaOutCaps, ChanCaps, ChannelClass, DigInpCaps};

/// The fields of a `CHANINFO` record that classification actually reads.
/// Scoped `CHANREP*` updates never carry enough of the record to
/// reclassify, so only full-scope reps go through this.
pub struct ClassifyInput {
    pub chancaps: ChanCaps,
    pub dinpcaps: DigInpCaps,
    pub aoutcaps: AnaOutCaps,
}

pub fn classify(input: &ClassifyInput) -> ChannelClass {
    let caps = input.chancaps;

    if caps.contains(ChanCaps::AINP) {
        return if caps.contains(ChanCaps::ISOLATED) {
            ChannelClass::FrontEnd
        } else {
            ChannelClass::AnalogIn
        };
    }

    if caps.contains(ChanCaps::DINP) {
        return if input.dinpcaps.contains(DigInpCaps::SERIALMASK) {
            ChannelClass::Serial
        } else {
            ChannelClass::DigitalIn
        };
    }

    if caps.contains(ChanCaps::DOUT) {
        return ChannelClass::DigitalOut;
    }

    if caps.contains(ChanCaps::AOUT) && input.aoutcaps.contains(AnaOutCaps::AUDIO) {
        return ChannelClass::Audio;
    }

    ChannelClass::Any
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_ainp_is_frontend() {
        let input = ClassifyInput {
            chancaps: ChanCaps::AINP | ChanCaps::ISOLATED,
            dinpcaps: DigInpCaps::empty(),
            aoutcaps: AnaOutCaps::empty(),
        };
        assert_eq!(classify(&input), ChannelClass::FrontEnd);
    }

    #[test]
    fn non_isolated_ainp_is_analog_in() {
        let input = ClassifyInput {
            chancaps: ChanCaps::AINP,
            dinpcaps: DigInpCaps::empty(),
            aoutcaps: AnaOutCaps::empty(),
        };
        assert_eq!(classify(&input), ChannelClass::AnalogIn);
    }

    #[test]
    fn serial_mask_dinp_is_serial() {
        let input = ClassifyInput {
            chancaps: ChanCaps::DINP,
            dinpcaps: DigInpCaps::SERIALMASK,
            aoutcaps: AnaOutCaps::empty(),
        };
        assert_eq!(classify(&input), ChannelClass::Serial);
    }

    #[test]
    fn plain_dinp_is_digital_in() {
        let input = ClassifyInput {
            chancaps: ChanCaps::DINP,
            dinpcaps: DigInpCaps::empty(),
            aoutcaps: AnaOutCaps::empty(),
        };
        assert_eq!(classify(&input), ChannelClass::DigitalIn);
    }

    #[test]
    fn audio_aout_is_audio_not_dout() {
        let input = ClassifyInput {
            chancaps: ChanCaps::AOUT,
            dinpcaps: DigInpCaps::empty(),
            aoutcaps: AnaOutCaps::AUDIO,
        };
        assert_eq!(classify(&input), ChannelClass::Audio);
    }

    #[test]
    fn no_matching_caps_is_any() {
        let input = ClassifyInput {
            chancaps: ChanCaps::empty(),
            dinpcaps: DigInpCaps::empty(),
            aoutcaps: AnaOutCaps::empty(),
        };
        assert_eq!(classify(&input), ChannelClass::Any);
    }
}
