use std::time::Duration;

use crate::Event;

pub fn main(period: Duration, sender: flume::Sender<Event>) -> anyhow::Result<()> {
    std::thread::spawn(move || {
        while let Ok(()) = sender.send(Event::Tick) {
            std::thread::sleep(period);
        }
    });
    Ok(())
}
