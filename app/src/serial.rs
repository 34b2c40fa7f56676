use core::fmt::Write;

use touchsense::TouchEvent;

/// Write one line describing a touch event
pub fn report<W: Write>(out: &mut W, event: &TouchEvent) {
    let _ = match event {
        TouchEvent::Done(pad) => write!(out, "DONE PAD{}\r\n", pad),
        TouchEvent::Active(pad) => write!(out, "TOUCH PAD{}\r\n", pad),
        TouchEvent::Inactive(pad) => write!(out, "RELEASE PAD{}\r\n", pad),
        TouchEvent::ScanDone => Ok(()),
        TouchEvent::Timeout(pad) => write!(out, "TIMEOUT PAD{}\r\n", pad),
        TouchEvent::ProximityDone { channel, detected } => {
            write!(out, "PROX PAD{} {}\r\n", channel, *detected as u8)
        }
    };
}

/// Command console on USART1
///
/// Output is buffered and drained one byte per TXE interrupt. Received bytes
/// are buffered as single-character commands. Both queues live with the port
/// behind one critical-section mutex.
pub mod console {
    use core::cell::RefCell;

    use cortex_m::interrupt::{self as irq, Mutex};
    use heapless::spsc::Queue;
    use stm32f0xx_hal::gpio::{gpiob, Alternate, AF0};

    use crate::hal::pac::{self, interrupt};
    use crate::hal::prelude::*;
    use crate::hal::serial::{Event, Serial};

    const TX_LEN: usize = 256;
    const RX_LEN: usize = 8;

    type Usart = Serial<pac::USART1, gpiob::PB6<Alternate<AF0>>, gpiob::PB7<Alternate<AF0>>>;

    struct Port {
        usart: Usart,
        tx: Queue<u8, TX_LEN>,
        rx: Queue<u8, RX_LEN>,
    }

    static PORT: Mutex<RefCell<Option<Port>>> = Mutex::new(RefCell::new(None));

    /// Writer for the console. Output is dropped until `init` runs, and when
    /// the transmit buffer is full.
    pub struct Console;

    impl core::fmt::Write for Console {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            irq::free(|cs| {
                if let Some(port) = PORT.borrow(cs).borrow_mut().as_mut() {
                    for b in s.bytes() {
                        if port.tx.enqueue(b).is_err() {
                            break;
                        }
                    }
                    port.usart.listen(Event::Txe);
                }
            });
            Ok(())
        }
    }

    pub fn init(mut usart: Usart, irq_prio: u8) {
        usart.listen(Event::Rxne);
        irq::free(|cs| {
            PORT.borrow(cs).replace(Some(Port {
                usart,
                tx: Queue::new(),
                rx: Queue::new(),
            }));
        });

        let mut nvic = unsafe { pac::CorePeripherals::steal() }.NVIC;
        unsafe {
            nvic.set_priority(pac::Interrupt::USART1, irq_prio);
            pac::NVIC::unmask(pac::Interrupt::USART1);
        }
    }

    /// Next command byte received, if any
    pub fn read_command() -> Option<u8> {
        irq::free(|cs| {
            PORT.borrow(cs)
                .borrow_mut()
                .as_mut()
                .and_then(|port| port.rx.dequeue())
        })
    }

    #[interrupt]
    fn USART1() {
        irq::free(|cs| {
            let mut port = PORT.borrow(cs).borrow_mut();
            let port = match port.as_mut() {
                Some(port) => port,
                None => return,
            };

            if let Ok(b) = port.usart.read() {
                // Commands arriving faster than the main loop reads them are dropped
                let _ = port.rx.enqueue(b);
            }

            match port.tx.peek().copied() {
                Some(b) => {
                    // WouldBlock until TXE, the byte stays queued
                    if port.usart.write(b).is_ok() {
                        port.tx.dequeue();
                    }
                }
                None => port.usart.unlisten(Event::Txe),
            }
        });
    }
}
