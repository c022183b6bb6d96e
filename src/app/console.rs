use std::{
    fmt::Display,
    io::{self, Write},
};

use crossterm::{cursor, execute, style::Print, terminal};
use log::debug;

pub struct Console {
    out: Box<dyn Write>,
    /// The last write was a status line without a trailing newline.
    status_pending: bool,
}

impl Console {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write>) -> Self {
        Self {
            out,
            status_pending: false,
        }
    }

    /// Ends a pending status line so the next write starts on a fresh line.
    pub fn newline(&mut self) {
        if self.status_pending {
            self.status_pending = false;
            let result = writeln!(self.out);
            self.report(result);
        }
    }

    pub fn print(&mut self, message: impl Display) {
        self.newline();
        let result = writeln!(self.out, "{}", message);
        self.report(result);
    }

    pub fn status(&mut self, message: impl Display) {
        self.status_pending = true;
        let result = execute!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine),
            Print(message)
        );
        self.report(result);
    }

    fn report(&self, result: io::Result<()>) {
        if let Err(e) = result {
            debug!("Console write failed: {}", e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use super::Console;

    /// Writer whose contents stay readable after it is boxed into a `Console`.
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }

        pub fn console(&self) -> Console {
            Console::with_writer(Box::new(self.clone()))
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
