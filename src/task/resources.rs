//! Hardware Resource Assignment
//!
//! Splits the RP2350 peripherals into one group per task so each task owns its
//! pins outright. Nothing on the wristband is shared between tasks.
//!
//! # Pin Map (Pico 2 W)
//! - Ranger: trigger GPIO14, echo GPIO15 (5V echo through a divider)
//! - Vibration motor: GPIO16, PWM slice 0 channel A, via a transistor driver
//! - Pulse sensor: GPIO26 / ADC0
//! - CYW43439 radio: GPIO23 (power), GPIO25 (CS), GPIO24 (DIO), GPIO29 (CLK)

use assign_resources::assign_resources;
use embassy_rp::adc::InterruptHandler as AdcInterruptHandler;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::{self, PIO0};
use embassy_rp::pio::InterruptHandler as PioInterruptHandler;

assign_resources! {
    /// HC-SR04 ultrasonic ranger pins
    ranger: RangerResources {
        trigger_pin: PIN_14,
        echo_pin: PIN_15,
    },
    /// Vibration motor PWM output
    haptic: HapticResources {
        slice: PWM_SLICE0,
        pin: PIN_16,
    },
    /// Pulse sensor analog input
    pulse: PulseResources {
        adc: ADC,
        pin: PIN_26,
    },
    /// CYW43439 Wi-Fi radio, driven over PIO SPI
    radio: RadioResources {
        pwr_pin: PIN_23,
        cs_pin: PIN_25,
        dio_pin: PIN_24,
        clk_pin: PIN_29,
        pio: PIO0,
        dma: DMA_CH0,
    },
}

bind_interrupts!(pub struct Irqs {
    ADC_IRQ_FIFO => AdcInterruptHandler;
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});
