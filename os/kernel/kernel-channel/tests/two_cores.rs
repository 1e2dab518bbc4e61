use kernel_channel::{ChannelError, Consumer, CoreAction, CoreMessage, PhysMapper, Producer};
use kernel_info::cores::CoreId;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use std::thread;

const PAGE: usize = 4096;
const COUNT: u32 = 10_000;

#[repr(C, align(4096))]
struct SharedPages([u8; 4 * PAGE]);

/// Physical `0..4 * PAGE` backed by one host buffer that both "cores" see.
struct SharedMapper {
    base: usize,
}

impl SharedMapper {
    fn new(pages: &mut SharedPages) -> Self {
        Self {
            base: pages.0.as_mut_ptr().expose_provenance(),
        }
    }
}

unsafe impl PhysMapper for SharedMapper {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = usize::try_from(pa.as_u64()).unwrap();
        assert!(offset < 4 * PAGE);
        std::ptr::with_exposed_provenance_mut(self.base + offset)
    }
}

fn page(n: u64) -> PhysicalAddress {
    PhysicalAddress::new(n * PAGE as u64)
}

#[test]
fn messages_cross_threads_in_order() {
    let mut pages = Box::new(SharedPages([0; 4 * PAGE]));
    let mapper = SharedMapper::new(&mut pages);

    thread::scope(|s| {
        s.spawn(|| {
            let mut tx = Producer::<CoreMessage>::new(&mapper, page(0), page(1)).unwrap();
            for i in 0..COUNT {
                let msg = CoreMessage::new(CoreAction::Ping, CoreId::new(i), VirtualAddress::new(u64::from(i) << 12));
                loop {
                    match tx.write(&msg) {
                        Ok(()) => break,
                        Err(ChannelError::Full) => std::hint::spin_loop(),
                        Err(e) => panic!("{e}"),
                    }
                }
            }
        });

        s.spawn(|| {
            let mut rx = Consumer::<CoreMessage>::new(&mapper, page(0), page(1)).unwrap();
            for i in 0..COUNT {
                let msg = rx.read().unwrap();
                assert_eq!(msg.core_id(), CoreId::new(i));
                assert_eq!(msg.path(), VirtualAddress::new(u64::from(i) << 12));
            }
        });
    });
}

#[test]
fn both_directions_are_independent() {
    let mut pages = Box::new(SharedPages([0; 4 * PAGE]));
    let mapper = SharedMapper::new(&mut pages);

    // master: sends on pages 2/3, receives on 0/1; the slave mirrors it.
    let mut to_slave = Producer::<CoreMessage>::new(&mapper, page(2), page(3)).unwrap();
    let mut from_slave = Consumer::<CoreMessage>::new(&mapper, page(0), page(1)).unwrap();
    let mut to_master = Producer::<CoreMessage>::new(&mapper, page(0), page(1)).unwrap();
    let mut from_master = Consumer::<CoreMessage>::new(&mapper, page(2), page(3)).unwrap();

    to_master.write(&CoreMessage::ping(CoreId::new(1))).unwrap();
    assert_eq!(from_master.try_read(), Ok(None));
    assert_eq!(from_slave.read().unwrap().core_id(), CoreId::new(1));

    to_slave.write(&CoreMessage::ping(CoreId::MASTER)).unwrap();
    assert_eq!(from_slave.try_read(), Ok(None));
    let msg = from_master.read().unwrap();
    assert_eq!(msg.core_id(), CoreId::MASTER);
    assert_eq!(msg.action(), Ok(CoreAction::Ping));
}
