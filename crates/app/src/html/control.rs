/// Single-page control UI: live feed, movement controls, face detection
/// toggle, and the chat/voice command box.
pub const CONTROL_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Hexapod Robot Control</title>
    <style>
        body {
            font-family: Arial, sans-serif;
            background: #111;
            color: white;
            text-align: center;
            padding: 20px;
            margin: 0;
        }
        .section { margin-bottom: 30px; }
        .controls button {
            width: 80px;
            height: 80px;
            font-size: 1.5rem;
            margin: 10px;
            border-radius: 50%;
            border: none;
            background-color: #ff5722;
            color: white;
            cursor: pointer;
            transition: transform 0.1s, background-color 0.3s;
        }
        .controls button:active {
            transform: scale(0.95);
            background-color: #e64a19;
        }
        #response, #chatResponse {
            margin-top: 10px;
            color: #ffeb3b;
            min-height: 20px;
        }
        .video-container {
            margin: 20px auto;
            max-width: 640px;
            border-radius: 10px;
            overflow: hidden;
            box-shadow: 0 0 20px rgba(255, 87, 34, 0.3);
        }
        img {
            width: 100%;
            max-width: 640px;
            border-radius: 10px;
            display: block;
        }
        h1, h2 {
            color: #ff5722;
            text-shadow: 0 0 10px rgba(255, 87, 34, 0.5);
        }
        .input-row {
            display: flex;
            justify-content: center;
            align-items: center;
            gap: 10px;
            flex-wrap: wrap;
            margin: 10px 0;
        }
        .input-row input {
            padding: 10px;
            border-radius: 20px;
            border: none;
            flex: 1;
            max-width: 400px;
            background: #333;
            color: white;
        }
        .input-row button, .btn {
            padding: 10px 20px;
            border-radius: 20px;
            border: none;
            background: #ff5722;
            color: white;
            cursor: pointer;
        }
        .face-count {
            font-size: 24px;
            font-weight: bold;
            color: #4CAF50;
        }
    </style>
    <script>
        let faceDetectionEnabled = false;

        async function sendCommand(command) {
            try {
                const response = await fetch('/send_command', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ command: command })
                });
                const result = await response.json();
                document.getElementById('response').innerText = result.response;
            } catch (error) {
                document.getElementById('response').innerText = "Error: Could not send command";
            }
        }

        async function sendChatCommand() {
            const userMessage = document.getElementById('chatInput').value;
            if (!userMessage.trim()) return;
            document.getElementById('chatInput').value = '';
            document.getElementById('chatResponse').innerText = "Processing...";
            try {
                const response = await fetch('/chat_command', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ message: userMessage })
                });
                const result = await response.json();
                document.getElementById('chatResponse').innerText = result.response;
            } catch (error) {
                document.getElementById('chatResponse').innerText = "Error: Could not process command";
            }
        }

        function handleKeyPress(event) {
            if (event.keyCode === 13) { sendChatCommand(); }
        }

        function toggleFaceDetection() {
            fetch('/toggle_face_detection', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ 'enabled': !faceDetectionEnabled })
            })
            .then(response => response.json())
            .then(data => {
                faceDetectionEnabled = data.enabled;
                document.getElementById('toggleBtn').innerText =
                    faceDetectionEnabled ? 'Disable Face Detection' : 'Enable Face Detection';
            });
        }

        function updateFaceCount() {
            fetch('/face_count')
                .then(response => response.json())
                .then(data => {
                    document.getElementById('faceCount').innerText = data.count;
                })
                .catch(() => {});
        }

        function startVoiceRecognition() {
            if (!('SpeechRecognition' in window || 'webkitSpeechRecognition' in window)) {
                document.getElementById('chatResponse').innerText = "Speech recognition not supported in this browser";
                return;
            }
            const recognition = new (window.SpeechRecognition || window.webkitSpeechRecognition)();
            recognition.lang = 'en-US';
            recognition.interimResults = false;
            document.getElementById('chatResponse').innerText = "Listening...";
            recognition.start();
            recognition.onresult = function(event) {
                document.getElementById('chatInput').value = event.results[0][0].transcript;
                sendChatCommand();
            };
            recognition.onerror = function(event) {
                document.getElementById('chatResponse').innerText = "Voice recognition error: " + event.error;
            };
        }

        window.onload = function() {
            setInterval(updateFaceCount, 1000);
        };
    </script>
</head>
<body>
    <h1>Hexapod Robot Control</h1>

    <div class="section">
        <h2>Live Video Feed</h2>
        <div class="video-container">
            <img src="/video_feed" alt="Live Camera Feed">
        </div>
        <p>
            <button id="toggleBtn" class="btn" onclick="toggleFaceDetection()">Enable Face Detection</button>
        </p>
        <p>Faces Detected: <span id="faceCount" class="face-count">0</span></p>
    </div>

    <div class="section">
        <h2>Movement Controls</h2>
        <div class="controls">
            <button onclick="sendCommand('F')" title="Forward">&uarr;</button>
            <button onclick="sendCommand('L')" title="Left">&larr;</button>
            <button onclick="sendCommand('S')" title="Stop">&#9209;</button>
            <button onclick="sendCommand('R')" title="Right">&rarr;</button>
            <button onclick="sendCommand('B')" title="Backward">&darr;</button>
        </div>
        <p id="response"></p>
    </div>

    <div class="section">
        <h2>Voice &amp; Text Commands</h2>
        <div class="input-row">
            <input type="text" id="chatInput" placeholder="e.g., move forward for 5 seconds" onkeypress="handleKeyPress(event)">
            <button onclick="sendChatCommand()">Send</button>
            <button onclick="startVoiceRecognition()">&#127908; Speak</button>
        </div>
        <p id="chatResponse"></p>
    </div>
</body>
</html>
"#;
